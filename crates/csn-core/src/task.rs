//! Seed task model and cache-identity derivations.
//!
//! A task describes one origin resource to seed. Its identity fields
//! (`task_url`, `piece_size`, `range`, `digest`, `tag`, `filter`) decide
//! whether previously persisted state may be reused; the task id is a
//! digest of the normalized identity tuple and keys all storage artifacts.

use std::collections::HashMap;

use md5::{Digest, Md5};
use url::Url;

/// A logical request to seed a single origin resource into the CDN.
///
/// Constructed by the request frontend and passed immutably into cache
/// detection; later pipeline stages fill in what detection learned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedTask {
    /// Primary key: digest of the normalized request, see [`task_id`].
    pub id: String,
    /// The physical URL fetched from the origin.
    pub raw_url: String,
    /// Canonical form of `raw_url` used for cache identity, see [`filter_query`].
    pub task_url: String,
    /// Header name/value pairs forwarded to the origin on every probe and fetch.
    pub header: HashMap<String, String>,
    /// Fixed byte length of every piece except possibly the final one.
    pub piece_size: u32,
    /// Byte-range constraint; empty means the whole resource.
    pub range: String,
    /// Caller-supplied expected whole-file digest; empty means unknown.
    pub digest: String,
    /// Opaque caller-provided cache-key qualifier.
    pub tag: String,
    /// Query parameters (separated by `&`) dropped from `raw_url` to form `task_url`.
    pub filter: String,
}

impl SeedTask {
    /// Build a task from a raw request, deriving `task_url` and `id`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        raw_url: impl Into<String>,
        header: HashMap<String, String>,
        piece_size: u32,
        range: impl Into<String>,
        digest: impl Into<String>,
        tag: impl Into<String>,
        filter: impl Into<String>,
    ) -> Self {
        let raw_url = raw_url.into();
        let range = range.into();
        let digest = digest.into();
        let tag = tag.into();
        let filter = filter.into();
        let task_url = filter_query(&raw_url, &filter);
        let id = task_id(&task_url, &tag, &range, &filter, &digest);
        Self {
            id,
            raw_url,
            task_url,
            header,
            piece_size,
            range,
            digest,
            tag,
            filter,
        }
    }
}

/// Derive the task id from the normalized cache-identity tuple.
///
/// MD5 over the fields joined with a separator that cannot occur in a URL,
/// so distinct tuples never collide by concatenation. `filter` is hashed
/// in its own right: filtering is often a no-op on the URL, yet tasks with
/// different filters must not share cached state.
pub fn task_id(task_url: &str, tag: &str, range: &str, filter: &str, digest: &str) -> String {
    let mut hasher = Md5::new();
    for field in [task_url, tag, range, filter, digest] {
        hasher.update(field.as_bytes());
        hasher.update(b"\n");
    }
    crate::digest::hex_digest(hasher)
}

/// Canonicalize a fetch URL into its cache-identity form by dropping the
/// query parameters named in `filter` (separated by `&`).
///
/// A URL that does not parse is returned unchanged; identity then degrades
/// to the raw string, which is still stable for a given request.
pub fn filter_query(raw_url: &str, filter: &str) -> String {
    if filter.is_empty() {
        return raw_url.to_string();
    }
    let mut url = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(_) => return raw_url.to_string(),
    };
    let dropped: Vec<&str> = filter.split('&').filter(|f| !f.is_empty()).collect();
    if dropped.is_empty() {
        return raw_url.to_string();
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !dropped.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept).finish();
    }
    url.to_string()
}

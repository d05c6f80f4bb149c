//! Origin probes: freshness and byte-range support.
//!
//! Uses the curl crate (libcurl). The freshness probe replays the stored
//! validators (`Last-Modified`, `ETag`) as a conditional HEAD; the range
//! probe issues a `Range: 0-0` GET and discards the single body byte.
//! Neither probe consumes a response body, and both follow redirects under
//! the same policy as the fetcher so cache identity matches fetch identity.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::CsnConfig;

/// Validator name for the `Last-Modified` entry of `expire_info`.
pub const LAST_MODIFIED: &str = "last-modified";
/// Validator name for the `ETag` entry of `expire_info`.
pub const ETAG: &str = "etag";

/// Stored validators for a cached resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireInfo {
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

impl ExpireInfo {
    /// Pick the known validators out of a metadata `expire_info` map.
    pub fn from_map(expire_info: &HashMap<String, String>) -> Self {
        Self {
            last_modified: expire_info.get(LAST_MODIFIED).cloned(),
            etag: expire_info.get(ETAG).cloned(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.etag.is_none()
    }
}

/// Origin client seam consumed by the cache detector.
pub trait OriginClient {
    /// Whether the stored copy identified by `info` is stale at the origin.
    fn is_expired(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        info: &ExpireInfo,
    ) -> Result<bool>;

    /// Whether the origin honors byte-range requests for `url`.
    fn is_support_range(&self, url: &str, headers: &HashMap<String, String>) -> Result<bool>;
}

/// Probe tuning shared by both probes.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_redirects: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

impl From<&CsnConfig> for ProbeOptions {
    fn from(cfg: &CsnConfig) -> Self {
        Self {
            connect_timeout: cfg.probe_connect_timeout(),
            timeout: cfg.probe_timeout(),
            max_redirects: cfg.probe_max_redirects,
        }
    }
}

/// HTTP origin client backed by libcurl.
#[derive(Debug, Clone, Default)]
pub struct HttpSource {
    opts: ProbeOptions,
}

impl HttpSource {
    pub fn new(opts: ProbeOptions) -> Self {
        Self { opts }
    }

    fn easy(&self, url: &str) -> Result<curl::easy::Easy> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url).context("invalid URL")?;
        easy.follow_location(true)?;
        easy.max_redirections(self.opts.max_redirects)?;
        easy.connect_timeout(self.opts.connect_timeout)?;
        easy.timeout(self.opts.timeout)?;
        Ok(easy)
    }
}

fn header_list(
    headers: &HashMap<String, String>,
    extra: &[(&str, &str)],
) -> Result<curl::easy::List> {
    let mut list = curl::easy::List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    for (k, v) in extra {
        list.append(&format!("{}: {}", k, v))?;
    }
    Ok(list)
}

impl OriginClient for HttpSource {
    fn is_expired(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        info: &ExpireInfo,
    ) -> Result<bool> {
        if info.is_empty() {
            // Nothing to compare against; treat the copy as current rather
            // than forcing a reseed of every validator-less resource.
            return Ok(false);
        }
        let mut conditional: Vec<(&str, &str)> = Vec::new();
        if let Some(last_modified) = &info.last_modified {
            conditional.push(("If-Modified-Since", last_modified));
        }
        if let Some(etag) = &info.etag {
            conditional.push(("If-None-Match", etag));
        }

        let mut easy = self.easy(url)?;
        easy.nobody(true)?;
        easy.http_headers(header_list(headers, &conditional)?)?;
        easy.perform().context("freshness probe failed")?;
        let code = easy.response_code().context("no response code")?;
        match code {
            304 => Ok(false),
            200..=299 => Ok(true),
            _ => anyhow::bail!("freshness probe for {} returned HTTP {}", url, code),
        }
    }

    fn is_support_range(&self, url: &str, headers: &HashMap<String, String>) -> Result<bool> {
        let mut easy = self.easy(url)?;
        easy.range("0-0")?;
        easy.http_headers(header_list(headers, &[])?)?;
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| Ok(data.len()))?;
            transfer.perform().context("range probe failed")?;
        }
        let code = easy.response_code().context("no response code")?;
        match code {
            206 => Ok(true),
            200..=299 => Ok(false),
            _ => anyhow::bail!("range probe for {} returned HTTP {}", url, code),
        }
    }
}

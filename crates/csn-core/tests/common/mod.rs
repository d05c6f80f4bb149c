pub mod origin_server;

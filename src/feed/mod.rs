//! RSS feed: document rendering and the HTTP endpoint that serves it.

pub mod rss;
pub mod server;

#![forbid(unsafe_code)]

//! playerwatch answers "who is on the server right now?" by following a game
//! server's log.
//!
//! Pipeline:
//! 1. **Tailer**: replays compressed archives oldest first, then follows the
//!    live log from a byte offset, surviving truncation and rotation
//! 2. **Extractor**: turns login/logout lines into timestamped events
//! 3. **Tracker**: single writer of the online/offline table
//! 4. **Renderer**: "2 players: alex on for 5m, steve on for 1h 2m"
//!
//! # Library usage
//!
//! ```rust,no_run
//! use playerwatch::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use playerwatch::core::config::Config;
//! use playerwatch::tail::extract::EventExtractor;
//! ```

pub mod prelude;

pub mod core;
#[cfg(feature = "daemon")]
pub mod daemon;
pub mod feed;
pub mod logger;
pub mod presence;
pub mod tail;

#[cfg(test)]
mod presence_properties_tests;

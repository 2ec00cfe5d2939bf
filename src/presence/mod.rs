//! Presence state: the online/offline table, its single-writer tracker, and the
//! display renderer.

pub mod render;
pub mod table;
pub mod tracker;

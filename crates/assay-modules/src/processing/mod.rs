//! Built-in processing modules.

pub mod analysisinfo;
pub mod dropped;

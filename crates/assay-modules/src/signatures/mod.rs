//! Built-in signature modules.

pub mod dropped_files;

//! Commands module - project operations as library functions
//!
//! These commands are used by the CLI and any other front end.

pub mod project;

//! gclangd - a deliberately lazy LSP server for C/C++.
//!
//! No compiler front-end, no index: navigation requests are answered by
//! shelling out to `grep` and ranking the hits with lexical heuristics.
//!
//! Module structure:
//! - heuristics: line-level token/comment/string classification
//! - rank: scoring and ordering of raw grep matches
//! - search: the grep subprocess (spawn, stream, cap, cancel, reap)
//! - server: protocol loop, request dispatch and cancellation
//! - uri: path <-> file:// URI conversion, path normalization
//! - logging: tracing setup (file or stderr, never stdout)

pub mod heuristics;
pub mod logging;
pub mod rank;
pub mod search;
pub mod server;
pub mod uri;

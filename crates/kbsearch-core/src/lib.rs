//! kbsearch-core
//!
//! Domain types, configuration, typed metadata filters and the document
//! chunker shared by every other `kbsearch-*` crate.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod filter;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

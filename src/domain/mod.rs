//! Core domain types for the asset cache: records, typed metadata
//! blobs, and canonical URL rules.

pub mod entities;
pub mod error;
pub mod meta;
pub mod types;
pub mod url;

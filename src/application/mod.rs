pub mod admin;
pub mod error;
pub mod metadata;
pub mod pagination;
pub mod registry;
pub mod repos;
pub mod resolve;
pub mod scope;
pub mod sync;

//! Specchio: a remote asset-cache resolution service.
//!
//! Rendering pipelines hand Specchio batches of local asset URLs and
//! get back the remote URLs those assets were previously cached at,
//! while anything stale or unseen is scheduled, bounded per request,
//! for background sync to the remote transformation service.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

//! A uniform key/blob storage contract with interchangeable in-memory,
//! filesystem and S3-compatible backends.

pub mod config;
pub mod store;

//! Core data models for the file-sharing service.
//!
//! `stored_file` describes what lives in the storage directory; `api` holds
//! the JSON shapes served to clients.

pub mod api;
pub mod stored_file;

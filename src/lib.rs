//! lanshare: share files across the local network.
//!
//! Clients upload files over HTTP, the server keeps them in one flat
//! directory, lists them, and deletes each file once it has been downloaded.
//! A background reclaimer removes abandoned uploads and expired files.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod text;

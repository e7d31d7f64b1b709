//! blobscan: enumerate a public blob container, filter the listing by
//! extension or name, and print it or download the selection concurrently.

pub mod config;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

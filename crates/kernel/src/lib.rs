//! Folio Kernel Library
//!
//! Page layout persistence, versioning and translation fan-out.
//! The `folio` binary is a thin command-line front end over this library.

pub mod config;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod services;
pub mod storage;

//! envm HTTP server.
//!
//! Exposes the organization, project, environment, and variable services
//! from `envm-core` as a JSON API under `/api/v1`, with bearer or cookie
//! authentication.

pub mod config;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod state;
pub mod validate;

pub use routes::router;

//! Core library for envm.
//!
//! Contains the value cipher, access-token maker, session manager,
//! role-based authorizer, typed repository, and the account, organization,
//! project, and environment services built on them. This crate depends on
//! `envm-storage` for the storage backend trait and knows nothing about
//! HTTP.

pub mod accounts;
pub mod authz;
pub mod crypto;
pub mod environments;
pub mod error;
pub mod members;
pub mod models;
pub mod naming;
pub mod notify;
pub mod orgs;
pub mod password;
pub mod projects;
pub mod repository;
pub mod services;
pub mod session;
pub mod token;
pub mod values;

pub use services::Services;

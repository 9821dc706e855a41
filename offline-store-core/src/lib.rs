//! Offline store for feature-store resources on PostgreSQL.
//!
//! Stores entity/value/timestamp resource tables, builds latest-value
//! materializations and point-in-time correct training sets, and streams
//! results back through forward-only iterators.

pub mod config;
pub mod error;
pub mod model;
pub mod naming;
pub mod offlinestore;
mod sql;
pub mod value;

//! Nebula: a paginated posts and users REST API with conditional reads and a
//! bounded-staleness output cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

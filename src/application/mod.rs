//! Application services coordinating domain rules with persistence.

pub mod conditional;
pub mod error;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod users;

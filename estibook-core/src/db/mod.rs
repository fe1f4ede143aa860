//! Database layer: schema migrations and the version store repository

pub mod repo;
pub mod schema;

pub use repo::Database;

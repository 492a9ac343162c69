//! Data access layer
//!
//! Repositories are traits so the pipeline and services can run against
//! the MySQL implementations in production and in-memory or mock
//! implementations in tests.

pub mod school;
pub mod user;

pub use school::{SchoolRepository, SchoolRepositoryImpl};
pub use user::{UserRepository, UserRepositoryImpl};

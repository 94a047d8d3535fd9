//! Database module for the auth server
//!
//! Persistence for user accounts. The usecase layer talks to the
//! `UserRepository` trait; `DbOperations` is the Postgres implementation.

pub mod models;
pub mod operations;

pub use models::{NewUser, PublicProfile, User};
pub use operations::{DbOperations, UserRepository};

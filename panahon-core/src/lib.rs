//! Core library for the Panahon weather-station API.
//!
//! Holds the authentication core (token codec, password hashing, refresh
//! sessions), the first-or-create provisioner for telco access tokens, and
//! the persistence ports with their PostgreSQL and in-process adapters.

pub mod auth;
pub mod database;
pub mod error;
pub mod telco;
pub mod users;

pub use error::{AuthError, AuthResult};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

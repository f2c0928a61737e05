//! HTTP surface of the Panahon weather-station API.

pub mod auth;
pub mod infra;
pub mod routes;
pub mod telco;

pub use infra::app_state::AppState;

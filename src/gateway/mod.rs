//! # Gateway Module
//!
//! The admission layer shared by every route, the HTTP routes themselves,
//! and the server that runs them.

pub mod admission;
pub mod routes;
pub mod server;

pub use admission::{AdmissionConfig, AdmissionController, AdmissionError, Resolved, Source};
pub use routes::{create_router, AppState};
pub use server::{build_state, shutdown_signal, GatewayServer};

//! Virtual try-on gateway
//!
//! Backend for an embeddable try-on widget: accepts a person image plus
//! garment images, forwards them to the fal.ai image provider, and exposes
//! an async job API (submit, then poll) alongside a blocking generate call.
//! Usage is recorded per client key for the admin dashboard.

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub mod auth;
pub mod backoff;
pub mod clients;
pub mod dispatcher;
pub mod job_store;
pub mod provider;
pub mod usage;

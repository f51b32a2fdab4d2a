pub mod client;
pub mod generation;
pub mod job;
pub mod metrics;
pub mod upload;

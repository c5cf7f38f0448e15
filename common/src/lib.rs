// Common library for the reports service: configuration, database access, telemetry

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod retry;
pub mod telemetry;

pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod telemetry;

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod persistence;
pub mod relay;
pub mod upstream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

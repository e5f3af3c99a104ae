pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod forecast;
pub mod http;
pub mod models;
pub mod providers;
pub mod scheduler;
pub mod sink;
pub mod utils;

pub use error::{CollectorError, Result};

//! Bootstrap helpers for the printfarm server

pub mod config;

pub use config::load_config;

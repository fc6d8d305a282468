pub mod app;
pub mod cli;
pub mod config;
pub mod filter;
pub mod highlight;
pub mod message;
pub mod settings;
pub mod storage;
pub mod tasks;
pub mod tracker;
pub mod ui;
pub mod worktime;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};

pub mod config;
pub mod core;
pub mod db;
pub mod fetcher;
pub mod forecast;
pub mod logging;
pub mod models;

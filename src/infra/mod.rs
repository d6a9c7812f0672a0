pub mod app;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod http_client;
pub mod rate_limit;
pub mod setup;

pub mod api;
pub mod backup;
pub mod config;
pub mod db;
pub mod export;
pub mod import;
pub mod logging;
pub mod server;

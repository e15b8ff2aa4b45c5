pub mod config;
pub mod connection;
pub mod database;
pub mod types;

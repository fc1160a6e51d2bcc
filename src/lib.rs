pub mod aggregate;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod handlers;
pub mod ingest;
pub mod insights;
pub mod model;
pub mod models;
pub mod risk;

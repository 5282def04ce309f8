pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod error;
pub mod filter;
pub mod logging;
pub mod record;
pub mod selection;
pub mod server;

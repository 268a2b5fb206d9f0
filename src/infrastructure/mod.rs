pub mod booking_client;
pub mod config;
pub mod error;
pub mod wire;

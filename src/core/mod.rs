pub mod config;
pub mod event;
pub mod message;
pub mod monitor;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod transport;
pub mod usage;

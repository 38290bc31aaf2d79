pub mod config;
pub mod listener;
pub mod tls;
pub mod worker;

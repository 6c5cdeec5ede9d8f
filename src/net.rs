pub mod connection;
pub mod server;

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod proto;
pub mod services;
pub mod state;
pub mod store;

// Convenient re-exports (so call sites can do `ipstash::Registry`, etc.)
pub use state::{
    registry::Registry,
    session::{ConnState, Session},
};

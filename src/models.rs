pub mod client;

pub use client::{ClientMap, ClientRecord, FileEntry};

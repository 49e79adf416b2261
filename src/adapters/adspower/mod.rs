pub mod client;

pub use client::AdsPowerClient;

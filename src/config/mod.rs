//! Client configuration model.

pub mod client;

pub use client::ClientConfig;

//! Order notification hub library.
//! This crate exposes internal modules for integration testing and for the
//! client adapter. The binary entry point is in main.rs.

pub mod api;
pub mod client;
pub mod config;
pub mod hub;
pub mod proto;
pub mod routes;
pub mod state;
pub mod ws;

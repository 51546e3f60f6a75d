//! # psyportal API
//! Typed REST client for the clinic backend.

pub mod client;

pub use client::HttpBackend;

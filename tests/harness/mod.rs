//! Test harness for end-to-end hub tests.
//!
//! A [`TestServer`] runs a real hub on its own thread; a [`TestClient`] talks
//! to it over raw TCP using the crate's own frame builder.

#![allow(dead_code)]

mod client;
mod server;

pub use client::TestClient;
pub use server::TestServer;

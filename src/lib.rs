//! KAT — Kalshi Algorithmic Trading console.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod opener;
pub mod client;
pub mod feed;
pub mod site;
pub mod dashboard;

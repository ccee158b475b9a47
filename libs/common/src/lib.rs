//! Common library for the admin gate
//!
//! This crate provides shared functionality used by the gate service,
//! including database connectivity, error handling, and the process-local
//! cache used for identity snapshots.

pub mod cache;
pub mod database;
pub mod error;

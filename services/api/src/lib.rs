//! services/api/src/lib.rs
//!
//! The TrustPaws HTTP service: Postgres and SMTP adapters for the core ports,
//! and the axum web layer on top of them.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

//! TradePulse trade aggregation library
//!
//! Syncs broker order history into per-account position documents and derives
//! trading metrics and a strategy-adherence calendar from them.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;

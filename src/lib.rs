//! # Activity Tracker Library
//!
//! Tracks the public event streams of a small set of GitHub repositories:
//! conditional paginated ingestion, deduplicating merge, bounded retention and
//! per-event-type timing statistics, served over an HTTP API.

pub mod config;
pub mod connectors;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod statistics;
pub mod storage;
pub mod telemetry;
pub mod tracker;

//! Minute-bar market data collector
//!
//! Polls an intraday price provider during exchange trading hours and stores
//! one row per `(symbol, minute)` without duplicates. The session state
//! machine in [`session`] decides when to poll; [`ingestion`] drives the
//! loop.

pub mod calendar;
pub mod common;
pub mod config;
pub mod ingestion;
pub mod logging;
pub mod postgres;
pub mod provider;
pub mod session;
pub mod store;

//! # PriceWatch Worker Library
//!
//! Background price scanning: a [`scheduler::Scheduler`] runs a
//! [`scan::ProductScanner`] batch at startup and then on a fixed interval.
//!
//! ## Modules
//!
//! - `config`: Environment configuration
//! - `scan`: One sequential pass over every tracked product
//! - `scheduler`: Interval loop with graceful shutdown

pub mod config;
pub mod scan;
pub mod scheduler;

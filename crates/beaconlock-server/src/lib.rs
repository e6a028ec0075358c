//! # beaconlock-server
//!
//! HTTP control surface for the beaconlock proximity monitor.
//!
//! This library provides the API handlers, the shared state that owns the
//! monitor supervisor, and the event feed the handlers read from.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod feed;
pub mod logging;
pub mod scanner;
pub mod state;

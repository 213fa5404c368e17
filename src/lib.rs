//! appcontrollerd - single-instance application supervisor for embedded
//! targets.
//!
//! One instance per device launches a target application, forwards its
//! output, negotiates debug connectivity on dynamically discovered ports,
//! and honors remote stop requests delivered over a well-known control
//! endpoint. A second invocation never runs alongside the first: it either
//! displaces it or tells it to stop and exits.

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod launch;
pub mod ports;
pub mod supervisor;

pub use error::{AppError, Result};

//! # lib-ami-model
//!
//! Behavioral IBIS-AMI equalization model.
//!
//! The crate builds as a shared library exporting `AMI_Init`,
//! `AMI_GetWave` and `AMI_Close`, and as an rlib for hosts written in
//! Rust (the CLI and the integration tests).
//!
//! - [`config`]: parameter tree to stage settings
//! - [`session`]: one model instance and its lifecycle
//! - [`registry`]: handle ids to live sessions
//! - [`exports`]: the C entry points
//!
//! # Safety
//!
//! The exported functions trust the host's pointers and sizes as the
//! IBIS-AMI calling convention defines them. Everything else is safe
//! Rust, and no panic crosses the boundary.

pub mod config;
pub mod error;
pub mod exports;
pub mod registry;
pub mod session;

pub use config::{ModelConfig, TapBudgetPolicy};
pub use error::{AmiError, AmiResult};
pub use exports::{AMI_Close, AMI_GetWave, AMI_Init};
pub use registry::SessionRegistry;
pub use session::{InitRequest, Session};

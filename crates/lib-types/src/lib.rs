//! # lib-types
//!
//! Core type definitions for the AMI equalization kernel.
//!
//! This crate provides foundational types used throughout the workspace:
//! - Physical units with compile-time safety
//! - Waveform representation for time-domain signals
//! - AMI parameter values, session state and boundary status codes

pub mod units;
pub mod waveform;
pub mod ami;

pub use units::*;
pub use waveform::*;
pub use ami::*;

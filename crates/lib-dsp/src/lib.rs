//! # lib-dsp
//!
//! Signal-processing core of the AMI equalization model.
//!
//! - **FIR**: oversampled feed-forward filter (Tx FFE, DFE feedback path)
//! - **IIR**: Direct Form II recursion with pole clamping, CTLE design
//! - **DFE**: decision feedback with LMS adaptation gated by clock lock
//! - **Clock**: edge tracking shared by all stages of a session
//! - **Pipeline**: ordered [`Stage`] objects driven block by block
//! - **Spectrum**: high-frequency boost of an equalized impulse
//! - **PRBS**: test and stimulus sequences

pub mod clock;
pub mod dfe;
pub mod error;
pub mod fir;
pub mod iir;
pub mod prbs;
pub mod spectrum;
pub mod stage;

pub use clock::{ClockBlock, ClockTracker};
pub use dfe::{Dfe, DfeMode, DfeSettings};
pub use error::{ConfigWarning, DspError, DspResult};
pub use fir::Fir;
pub use iir::Iir;
pub use prbs::PrbsGenerator;
pub use stage::{Pipeline, Stage};

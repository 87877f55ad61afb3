//! Pseudo-random bit sequences for driving the equalizers.

use crate::error::{DspError, DspResult};
use lib_types::units::Seconds;
use lib_types::waveform::Waveform;

/// PRBS generator using linear feedback shift register.
pub struct PrbsGenerator {
    /// Current LFSR state.
    state: u64,

    /// Feedback taps (XOR mask over the low state bits).
    taps: u64,

    /// Sequence length (2^order - 1).
    length: u64,

    /// PRBS order.
    order: u8,

    /// Bits generated so far.
    count: u64,
}

impl PrbsGenerator {
    /// Create a new PRBS generator.
    ///
    /// Supported orders: 7, 9, 11, 15, 23, 31
    pub fn new(order: u8) -> DspResult<Self> {
        let (taps, length) = match order {
            7 => (0b11, (1u64 << 7) - 1),
            9 => (0b1_0001, (1u64 << 9) - 1),
            11 => (0b101, (1u64 << 11) - 1),
            15 => (0b11, (1u64 << 15) - 1),
            23 => (0b10_0001, (1u64 << 23) - 1),
            31 => (0b1001, (1u64 << 31) - 1),
            _ => return Err(DspError::UnsupportedPrbsOrder(order)),
        };

        Ok(Self {
            state: 1,
            taps,
            length,
            order,
            count: 0,
        })
    }

    /// Get the PRBS order.
    pub fn order(&self) -> u8 {
        self.order
    }

    /// Get the sequence length.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Generate the next bit.
    pub fn next_bit(&mut self) -> u8 {
        // XOR all tapped bits
        let feedback = (self.state & self.taps).count_ones() & 1;

        // Shift and insert feedback
        self.state = (self.state >> 1) | ((feedback as u64) << (self.order - 1));

        self.count += 1;

        (self.state & 1) as u8
    }

    /// Generate N bits.
    pub fn generate_bits(&mut self, n: u64) -> Vec<u8> {
        (0..n).map(|_| self.next_bit()).collect()
    }

    /// Reset the generator to initial state.
    pub fn reset(&mut self) {
        self.state = 1;
        self.count = 0;
    }

    /// Set a custom initial state.
    pub fn set_state(&mut self, state: u64) {
        self.state = state & ((1 << self.order) - 1);
        if self.state == 0 {
            self.state = 1; // Avoid stuck state
        }
    }

    /// Get the current count of generated bits.
    pub fn bit_count(&self) -> u64 {
        self.count
    }

    /// Next `n` bits as bipolar symbols (1 maps to +1, 0 to -1).
    pub fn symbols(&mut self, n: usize) -> Vec<f64> {
        (0..n)
            .map(|_| if self.next_bit() == 1 { 1.0 } else { -1.0 })
            .collect()
    }

    /// Bipolar NRZ waveform, each symbol held for `samples_per_bit` samples.
    pub fn generate_nrz(&mut self, num_bits: usize, samples_per_bit: usize, dt: Seconds) -> Waveform {
        let mut samples = Vec::with_capacity(num_bits * samples_per_bit);
        for symbol in self.symbols(num_bits) {
            samples.extend(std::iter::repeat(symbol).take(samples_per_bit));
        }
        Waveform::new(samples, dt, Seconds::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prbs7_sequence_length() {
        let mut prbs = PrbsGenerator::new(7).unwrap();
        let initial = prbs.state;

        // Generate full sequence
        for _ in 0..127 {
            prbs.next_bit();
        }

        // Should return to initial state
        assert_eq!(prbs.state, initial);
    }

    #[test]
    fn test_prbs_balance() {
        // PRBS should have nearly equal ones and zeros
        let mut prbs = PrbsGenerator::new(7).unwrap();
        let bits = prbs.generate_bits(127);

        let ones: usize = bits.iter().map(|&b| b as usize).sum();
        let zeros = 127 - ones;

        // PRBS-7 should have 64 ones and 63 zeros (or vice versa)
        assert!((ones as i32 - zeros as i32).abs() <= 1);
    }

    #[test]
    fn test_unsupported_order() {
        assert!(matches!(
            PrbsGenerator::new(8),
            Err(DspError::UnsupportedPrbsOrder(8))
        ));
    }

    #[test]
    fn test_waveform_generation() {
        let mut prbs = PrbsGenerator::new(7).unwrap();
        let wf = prbs.generate_nrz(10, 64, Seconds::from_ps(1.0));

        assert_eq!(wf.samples.len(), 640);
        assert!(wf.samples.iter().all(|&v| v == 1.0 || v == -1.0));
    }
}

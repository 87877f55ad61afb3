//! Clock-edge tracking for the DFE slicer.
//!
//! Edges sit at `phase * UI + k * UI` from the start of the session. Time
//! is derived from the running sample count, never accumulated, so long
//! simulations do not drift. An edge fires on the sample nearest to it.

use crate::error::{DspError, DspResult};
use lib_types::units::Seconds;

/// Edge marks for one processed block.
///
/// `edges[n]` holds the edge time in seconds when an edge fired on sample
/// `n` of the block and `0.0` otherwise. Edges on samples at or after
/// `locked_from` were taken while the tracker was locked.
#[derive(Clone, Copy, Debug)]
pub struct ClockBlock<'a> {
    pub edges: &'a [f64],
    pub locked_from: usize,
}

impl<'a> ClockBlock<'a> {
    #[inline]
    pub fn edge_at(&self, n: usize) -> bool {
        self.edges.get(n).map_or(false, |&t| t != 0.0)
    }

    #[inline]
    pub fn locked_at(&self, n: usize) -> bool {
        n >= self.locked_from
    }
}

/// Running clock-edge tracker.
#[derive(Clone, Debug)]
pub struct ClockTracker {
    dt: Seconds,
    samples_per_ui: f64,
    phase: f64,
    lock_after: u64,
    sample_count: u64,
    edge_count: u64,
}

impl ClockTracker {
    /// `phase` is the first edge position as a fraction of a UI, in (0, 1].
    pub fn new(bit_time: Seconds, sample_interval: Seconds, phase: f64, lock_after: u64) -> DspResult<Self> {
        if !sample_interval.is_positive() || !bit_time.is_positive() {
            return Err(DspError::invalid("clock", "bit time and sample interval must be positive"));
        }
        if !(phase > 0.0 && phase <= 1.0) {
            return Err(DspError::invalid("cdr.phase", format!("{phase} must lie in (0, 1]")));
        }

        Ok(Self {
            dt: sample_interval,
            samples_per_ui: bit_time.0 / sample_interval.0,
            phase,
            lock_after,
            sample_count: 0,
            edge_count: 0,
        })
    }

    /// Position of the next edge, in samples from the session start.
    #[inline]
    fn next_edge_position(&self) -> f64 {
        (self.phase + self.edge_count as f64) * self.samples_per_ui
    }

    /// Advance over `marks.len()` samples, writing edge times into `marks`.
    ///
    /// Returns the index within the block from which edges count as locked.
    pub fn mark(&mut self, marks: &mut [f64]) -> usize {
        let len = marks.len();
        let mut locked_from = if self.is_locked() { 0 } else { len };

        for (n, mark) in marks.iter_mut().enumerate() {
            let position = self.sample_count as f64;
            let edge = self.next_edge_position();
            if position + 0.5 > edge {
                *mark = edge * self.dt.0;
                if self.edge_count == self.lock_after && locked_from == len {
                    locked_from = n;
                }
                self.edge_count += 1;
            } else {
                *mark = 0.0;
            }
            self.sample_count += 1;
        }
        locked_from
    }

    /// Locked once `lock_after` edges have been seen.
    pub fn is_locked(&self) -> bool {
        self.edge_count >= self.lock_after
    }

    pub fn edge_count(&self) -> u64 {
        self.edge_count
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn samples_per_ui(&self) -> f64 {
        self.samples_per_ui
    }

    /// Rewind to the session start.
    pub fn reset(&mut self) {
        self.sample_count = 0;
        self.edge_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(lock_after: u64) -> ClockTracker {
        ClockTracker::new(Seconds::from_ps(40.0), Seconds::from_ps(10.0), 0.5, lock_after).unwrap()
    }

    #[test]
    fn test_edges_every_ui_at_phase() {
        let mut clock = tracker(0);
        let mut marks = vec![0.0; 16];
        clock.mark(&mut marks);

        let fired: Vec<usize> = (0..16).filter(|&n| marks[n] != 0.0).collect();
        assert_eq!(fired, vec![2, 6, 10, 14]);
        assert!((marks[2] - 20e-12).abs() < 1e-18);
        assert!((marks[6] - 60e-12).abs() < 1e-18);
    }

    #[test]
    fn test_split_blocks_match_single_block() {
        let mut whole = tracker(3);
        let mut a = vec![0.0; 40];
        whole.mark(&mut a);

        let mut split = tracker(3);
        let mut b = vec![0.0; 40];
        let (first, second) = b.split_at_mut(13);
        split.mark(first);
        split.mark(second);

        assert_eq!(a, b);
        assert_eq!(whole.edge_count(), 10);
        assert_eq!(split.edge_count(), 10);
    }

    #[test]
    fn test_lock_index() {
        let mut clock = tracker(2);
        let mut marks = vec![0.0; 8];
        // Edges at 2 and 6; the third edge (index 10) would be the first locked one.
        assert_eq!(clock.mark(&mut marks), 8);
        assert!(clock.is_locked());

        let mut next = vec![0.0; 8];
        assert_eq!(clock.mark(&mut next), 0);
    }

    #[test]
    fn test_lock_inside_block() {
        let mut clock = tracker(1);
        let mut marks = vec![0.0; 12];
        assert_eq!(clock.mark(&mut marks), 6);
    }

    #[test]
    fn test_fractional_samples_per_ui_fires_nearest() {
        let mut clock = ClockTracker::new(Seconds(2.5), Seconds(1.0), 1.0, 0).unwrap();
        let mut marks = vec![0.0; 8];
        clock.mark(&mut marks);
        // Edges at 2.5, 5.0, 7.5 samples.
        let fired: Vec<usize> = (0..8).filter(|&n| marks[n] != 0.0).collect();
        assert_eq!(fired, vec![3, 5]);
    }

    #[test]
    fn test_rejects_bad_phase() {
        assert!(ClockTracker::new(Seconds::from_ps(40.0), Seconds::from_ps(10.0), 0.0, 0).is_err());
        assert!(ClockTracker::new(Seconds::from_ps(40.0), Seconds::from_ps(10.0), 1.5, 0).is_err());
    }
}

//! End-to-end session behavior through the registry.

use lib_ami_model::{AmiError, InitRequest, SessionRegistry};
use lib_dsp::PrbsGenerator;
use lib_params::ParameterView;
use lib_types::units::Seconds;

const SPUI: usize = 4;

fn sample_interval() -> Seconds {
    Seconds::from_ps(25.0)
}

fn bit_time() -> Seconds {
    Seconds::from_ps(100.0)
}

/// PRBS7 symbols through a UI-spaced ISI channel, held for one UI each.
fn channel_wave(num_ui: usize, cursors: &[f64]) -> Vec<f64> {
    let symbols = PrbsGenerator::new(7).unwrap().symbols(num_ui);
    let mut wave = Vec::with_capacity(num_ui * SPUI);
    for k in 0..num_ui {
        let v: f64 = cursors
            .iter()
            .enumerate()
            .filter(|(j, _)| k >= *j)
            .map(|(j, c)| c * symbols[k - j])
            .sum();
        wave.extend(std::iter::repeat(v).take(SPUI));
    }
    wave
}

fn open(registry: &SessionRegistry, params: &str) -> u64 {
    let mut impulse = vec![0.0; 64 * SPUI];
    impulse[2] = 1.0;
    registry
        .initialize(InitRequest {
            impulse: &mut impulse,
            row_count: 64 * SPUI,
            aggressors: 0,
            sample_interval: sample_interval(),
            bit_time: bit_time(),
            parameters: params,
        })
        .unwrap()
}

fn echo(registry: &SessionRegistry, id: u64) -> ParameterView {
    let text = registry.with_slot(id, |slot| slot.session.params_out()).unwrap();
    ParameterView::parse(&text).unwrap()
}

const FULL_CHAIN: &str = "(rx (tx_taps -0.05 0.85 -0.1) \
     (ctle (peak_freq 5e9) (boost_db 4)) \
     (dfe (mode Adaptive) (ntaps 3) (step_size 0.01)) \
     (cdr (lock_after 8)))";

#[test]
fn test_identical_sessions_are_bit_identical() {
    let registry = SessionRegistry::new();
    let input = channel_wave(2_000, &[1.0, 0.4, 0.1]);

    let run = |block: usize| {
        let id = open(&registry, FULL_CHAIN);
        let mut wave = input.clone();
        let mut clock = vec![0.0; wave.len()];
        for (w, c) in wave.chunks_mut(block).zip(clock.chunks_mut(block)) {
            registry.process_waveform(id, w, Some(c)).unwrap();
        }
        let report = echo(&registry, id).f64_list("dfe_taps").unwrap().unwrap();
        registry.close(id).unwrap();
        (wave, clock, report)
    };

    let (wave_a, clock_a, taps_a) = run(input.len());
    let (wave_b, clock_b, taps_b) = run(input.len());
    assert_eq!(wave_a, wave_b);
    assert_eq!(clock_a, clock_b);
    assert_eq!(taps_a, taps_b);

    // Splitting the stream into odd-sized blocks changes nothing.
    let (wave_c, clock_c, taps_c) = run(333);
    assert_eq!(wave_a, wave_c);
    assert_eq!(clock_a, clock_c);
    assert_eq!(taps_a, taps_c);
    assert_eq!(registry.live_sessions(), 0);
}

#[test]
fn test_clock_times_mark_one_edge_per_ui() {
    let registry = SessionRegistry::new();
    let id = open(&registry, "(rx (dfe (mode Init) (taps 0.0)))");

    let mut wave = channel_wave(100, &[1.0]);
    let mut clock = vec![0.0; wave.len()];
    registry.process_waveform(id, &mut wave, Some(&mut clock)).unwrap();

    let edges: Vec<(usize, f64)> = clock
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, t)| *t != 0.0)
        .collect();
    assert_eq!(edges.len(), 100);
    for pair in edges.windows(2) {
        assert_eq!(pair[1].0 - pair[0].0, SPUI);
        assert!((pair[1].1 - pair[0].1 - bit_time().0).abs() < 1e-18);
    }
    assert!((edges[0].1 - 0.5 * bit_time().0).abs() < 1e-18);
    registry.close(id).unwrap();
}

#[test]
fn test_adaptive_dfe_learns_channel_post_cursors() {
    let registry = SessionRegistry::new();
    let id = open(
        &registry,
        "(rx (dfe (mode Adaptive) (ntaps 3) (step_size 0.01)) (cdr (lock_after 8)))",
    );

    let mut wave = channel_wave(10_000, &[1.0, 0.5, 0.2]);
    for block in wave.chunks_mut(1_000) {
        registry.process_waveform(id, block, None).unwrap();
    }

    let view = echo(&registry, id);
    let taps = view.f64_list("dfe_taps").unwrap().unwrap();
    assert!((taps[0] - 0.5).abs() < 0.025);
    assert!((taps[1] - 0.2).abs() < 0.01);
    assert!(taps[2].abs() < 0.01);
    assert_eq!(view.bool_or("cdr_locked", false).unwrap(), true);
    assert_eq!(view.i64_or("cdr_edges", 0).unwrap(), 10_000);

    // Equalized eye at the last edges sits on the main cursor.
    let tail = &wave[wave.len() - 100 * SPUI..];
    for ui in tail.chunks(SPUI) {
        assert!((ui[2].abs() - 1.0).abs() < 0.02);
    }
    registry.close(id).unwrap();
}

#[test]
fn test_lifecycle_misuse_leaves_no_sessions() {
    let registry = SessionRegistry::new();
    let mut wave = vec![0.0; 16];

    let err = registry.process_waveform(5, &mut wave, None).unwrap_err();
    assert!(err.is_handle_error());

    let mut impulse = vec![0.0; 16];
    let bad = registry.initialize(InitRequest {
        impulse: &mut impulse,
        row_count: 16,
        aggressors: 0,
        sample_interval: sample_interval(),
        bit_time: bit_time(),
        parameters: "(rx (ctle (mode On)))",
    });
    assert!(matches!(bad, Err(AmiError::Parse(_))));
    assert_eq!(registry.live_sessions(), 0);

    let id = open(&registry, "(rx)");
    let mut short_clock = vec![0.0; 4];
    let err = registry
        .process_waveform(id, &mut wave, Some(&mut short_clock))
        .unwrap_err();
    assert!(matches!(err, AmiError::Configuration(_)));

    registry.close(id).unwrap();
    assert!(registry.close(id).unwrap_err().is_handle_error());
    assert_eq!(registry.live_sessions(), 0);
}

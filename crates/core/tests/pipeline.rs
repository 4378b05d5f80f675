use std::f32::consts::TAU;

use audioreactive_core::{
    ExtractorConfig, FeatureExtractor, Features, LayerRegistry, MemoryStore, ParamValue,
    RenderContext, RenderDriver, SpectrumAnalyser,
};

const SAMPLE_RATE: f32 = 44_100.0;
const FRAME_MS: f32 = 1_000.0 / 60.0;

fn assert_unit_interval(features: &Features) {
    let scalars = [
        features.rms01,
        features.rms_peak01,
        features.energy,
        features.energy_peak01,
        features.bands.low,
        features.bands.mid,
        features.bands.high,
        features.bands_raw.low,
        features.bands_raw.mid,
        features.bands_raw.high,
    ];
    for value in scalars.iter().chain(&features.bins).chain(&features.bins_log).chain(&features.bins_log_raw) {
        assert!((0.0..=1.0).contains(value), "{value} outside [0, 1]");
    }
}

/// 1024 linear bins with a -20 dB plateau between 600 and 1500 Hz.
fn mid_plateau() -> Vec<f32> {
    let nyquist = SAMPLE_RATE / 2.0;
    (0..1024)
        .map(|k| {
            let hz = k as f32 * nyquist / 1024.0;
            if (600.0..1500.0).contains(&hz) {
                -20.0
            } else {
                -100.0
            }
        })
        .collect()
}

#[test]
fn sustained_mid_tone_dominates_the_mid_band() {
    let mut extractor = FeatureExtractor::new(ExtractorConfig {
        log_bins: 8,
        ..Default::default()
    })
    .unwrap();
    let spectrum = mid_plateau();

    for frame in 0..50 {
        extractor.extract_at(frame as f32 * FRAME_MS, &spectrum, -20.0, SAMPLE_RATE);
    }
    let features = extractor.features();

    assert_eq!(features.bins.len(), 8);
    assert!(features.bins[4] > 0.99, "{:?}", features.bins);
    assert!(features.bins[5] > 0.99, "{:?}", features.bins);
    assert_eq!(features.bands.low, 0.0);
    assert!(features.bands.mid > 0.5, "{:?}", features.bands);
    assert!(features.bands.mid > features.bands.high);
    assert!((500.0..1_500.0).contains(&features.centroid_hz), "{}", features.centroid_hz);
    assert_unit_interval(features);
}

#[test]
fn silence_settles_to_zero() {
    let mut extractor = FeatureExtractor::default();
    let silence = vec![f32::NEG_INFINITY; 1024];

    for frame in 0..100 {
        let features =
            extractor.extract_at(frame as f32 * FRAME_MS, &silence, f32::NEG_INFINITY, SAMPLE_RATE);
        assert!(!features.onset);
    }
    let features = extractor.features();

    assert_eq!(features.energy, 0.0);
    assert_eq!(features.rms01, 0.0);
    assert_eq!(features.bands.low, 0.0);
    assert_eq!(features.bands.mid, 0.0);
    assert_eq!(features.bands.high, 0.0);
    assert!(features.bins.iter().all(|&v| v == 0.0));
    assert_eq!(features.centroid_hz, 0.0);
    assert_eq!(features.rolloff_hz, 0.0);
}

#[test]
fn empty_spectrum_still_reports_loudness() {
    let mut extractor = FeatureExtractor::default();
    for frame in 0..10 {
        extractor.extract_at(frame as f32 * FRAME_MS, &[], -20.0, SAMPLE_RATE);
    }
    let features = extractor.features();
    assert!(features.bins.is_empty());
    assert!(features.bins_log.is_empty());
    assert!(features.energy > 0.0);
    assert_eq!(features.bands.mid, 0.0);
}

#[test]
fn analysed_sine_lands_in_the_mid_band() {
    let mut analyser = SpectrumAnalyser::new(2048, 0.8).unwrap();
    let mut extractor = FeatureExtractor::default();
    let block: Vec<f32> = (0..2048)
        .map(|i| 0.5 * (TAU * 1_000.0 * i as f32 / SAMPLE_RATE).sin())
        .collect();

    for frame in 0..50 {
        let spectrum = analyser.analyse(&block, SAMPLE_RATE).unwrap();
        assert_eq!(spectrum.spectrum_db.len(), 1024);
        extractor.extract_at(
            frame as f32 * FRAME_MS,
            &spectrum.spectrum_db,
            spectrum.loudness_db,
            spectrum.sample_rate,
        );
        assert_unit_interval(extractor.features());
    }
    let features = extractor.features();

    assert!(features.bands.mid > features.bands.low, "{:?}", features.bands);
    assert!(features.bands.mid > features.bands.high, "{:?}", features.bands);
    assert!((500.0..2_000.0).contains(&features.centroid_hz), "{}", features.centroid_hz);
}

#[test]
fn driver_runs_layers_end_to_end() {
    let mut driver = RenderDriver::new(
        ExtractorConfig::default(),
        LayerRegistry::with_builtin(),
        Box::new(MemoryStore::new()),
        RenderContext::default(),
    )
    .unwrap();
    driver.set_active(["bars", "pulse"]);

    let spectrum = mid_plateau();
    let mut onset_frames = 0;
    let mut t = 0.0;
    for _ in 0..30 {
        let report = driver.frame_at(t, &spectrum, -70.0, SAMPLE_RATE);
        assert_eq!(report.enabled_layers, vec!["bars".to_string(), "pulse".to_string()]);
        onset_frames += usize::from(report.onset);
        t += FRAME_MS;
    }
    assert_eq!(onset_frames, 0);

    let report = driver.frame_at(t, &spectrum, -10.0, SAMPLE_RATE);
    assert!(report.onset);
    // 64 bars, their group and the pulse ring.
    assert_eq!(report.visible_nodes, 66);

    driver
        .set_param("bars", "count", ParamValue::Number(16.0))
        .unwrap();
    let report = driver.frame_at(t + FRAME_MS, &spectrum, -10.0, SAMPLE_RATE);
    assert_eq!(report.visible_nodes, 18);

    driver.set_active(["pulse"]);
    let report = driver.frame_at(t + 2.0 * FRAME_MS, &spectrum, -10.0, SAMPLE_RATE);
    assert_eq!(report.visible_nodes, 1);
    assert_eq!(driver.context().scene.len(), 18);

    driver.shutdown();
    assert!(driver.context().scene.is_empty());
}

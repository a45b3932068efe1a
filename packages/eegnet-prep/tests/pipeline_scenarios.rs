//! End-to-end behaviour of the offline and online paths on synthetic recordings.

use eegnet_prep::{
    Annotation, Channel, Dataset, OfflineBuilder, OnlineAdapter, PipelineConfig, PipelineError,
    Recording,
};
use ndarray::Array2;
use std::f64::consts::PI;

const EEG: [&str; 22] = [
    "Fz", "FC3", "FC1", "FCz", "FC2", "FC4", "C5", "C3", "C1", "Cz", "C2", "C4", "C6", "CP3",
    "CP1", "CPz", "CP2", "CP4", "P1", "Pz", "P2", "POz",
];
const EOG: [&str; 3] = ["EOG-left", "EOG-central", "EOG-right"];

/// 22 EEG + 3 EOG channels at 250 Hz, tens of microvolts, deterministic.
fn recording(n_samples: usize, eeg_channels: usize, annotations: Vec<Annotation>) -> Recording {
    let mut channels: Vec<Channel> = EEG[..eeg_channels].iter().map(|n| Channel::eeg(*n)).collect();
    channels.extend(EOG.iter().map(|n| Channel::auxiliary(*n)));

    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let data = Array2::from_shape_fn((channels.len(), n_samples), |(c, t)| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let noise = ((state >> 33) as f64 / (1u64 << 31) as f64 - 0.5) * 4e-6;
        let mu = 12.0 + 0.3 * c as f64;
        let beta = 22.0 + 0.1 * c as f64;
        let t = t as f64 / 250.0;
        15e-6 * (2.0 * PI * mu * t).sin() + 6e-6 * (2.0 * PI * beta * t + c as f64).cos() + noise
    });
    let annotations = annotations.into_iter().filter(|a| a.onset < n_samples).collect();
    Recording::new(channels, data, 250.0, annotations).unwrap()
}

fn task_annotations() -> Vec<Annotation> {
    vec![
        Annotation::new("768", 150),
        // window would start at -50
        Annotation::new("769", 200),
        Annotation::new("770", 1000),
        Annotation::new("1023", 1100),
        Annotation::new("771", 3000),
        Annotation::new("772", 5000),
        // window would end at 10500
        Annotation::new("769", 9500),
    ]
}

#[test]
fn yield_matches_fitting_task_events() {
    let rec = recording(10_000, 22, task_annotations());
    let dataset = OfflineBuilder::new(PipelineConfig::default())
        .unwrap()
        .build(&rec)
        .unwrap();

    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.labels, vec![1, 2, 3]);
    assert_eq!(dataset.onsets, vec![1000, 3000, 5000]);
    assert_eq!(dataset.channels, EEG.to_vec());
}

#[test]
fn tensors_have_model_shape_for_any_recording_length() {
    for n_samples in [6_000, 10_000, 17_500] {
        let rec = recording(n_samples, 22, task_annotations());
        let dataset = OfflineBuilder::new(PipelineConfig::default())
            .unwrap()
            .build(&rec)
            .unwrap();
        let shape = dataset.x.shape();
        assert_eq!(&shape[1..], &[22, 1000, 1]);
        assert_eq!(dataset.y.shape(), &[dataset.len(), 4]);
    }
}

#[test]
fn wrong_channel_count_produces_no_epochs() {
    let rec = recording(10_000, 20, task_annotations());
    let result = OfflineBuilder::new(PipelineConfig::default())
        .unwrap()
        .build(&rec);
    assert!(matches!(result, Err(PipelineError::ChannelMismatch(_))));
}

#[test]
fn window_past_end_is_dropped() {
    let rec = recording(2_000, 22, vec![Annotation::new("769", 1000)]);
    let builder = OfflineBuilder::new(PipelineConfig::default()).unwrap();

    let (_, epochs, located) = builder.extract_epochs(&rec).unwrap();
    assert_eq!(located, 1);
    assert!(epochs.is_empty());

    assert!(matches!(
        builder.build(&rec),
        Err(PipelineError::EmptyDataset { located: 1, dropped: 1 })
    ));
}

#[test]
fn recording_without_task_events_fails() {
    let rec = recording(3_000, 22, vec![Annotation::new("276", 0)]);
    let result = OfflineBuilder::new(PipelineConfig::default())
        .unwrap()
        .build(&rec);
    assert!(matches!(result, Err(PipelineError::NoEventsFound { .. })));
}

#[test]
fn online_and_offline_tensors_are_bit_identical() {
    let config = PipelineConfig::default();
    let rec = recording(10_000, 22, task_annotations());
    let builder = OfflineBuilder::new(config.clone()).unwrap();
    let adapter = OnlineAdapter::new(config).unwrap();

    let dataset = builder.build(&rec).unwrap();
    let (_, epochs, _) = builder.extract_epochs(&rec).unwrap();
    assert_eq!(epochs.len(), dataset.len());

    for (i, epoch) in epochs.iter().enumerate() {
        let online = adapter.transform(epoch.data.view()).unwrap();
        assert_eq!(online, builder.transform_one(epoch).unwrap());
        assert_eq!(online, dataset.sample(i).unwrap());
    }
}

#[test]
fn request_body_roundtrip_preserves_parity() {
    let config = PipelineConfig::default();
    let rec = recording(10_000, 22, task_annotations());
    let builder = OfflineBuilder::new(config.clone()).unwrap();
    let adapter = OnlineAdapter::new(config).unwrap();

    let (_, epochs, _) = builder.extract_epochs(&rec).unwrap();
    let epoch = &epochs[1];

    // What a client sends: the earliest SAMPLES of the raw window, in volts
    let rows: Vec<Vec<f64>> = epoch
        .data
        .rows()
        .into_iter()
        .map(|r| r.iter().take(1000).copied().collect())
        .collect();
    let body = serde_json::to_string(&rows).unwrap();
    let parsed: Vec<Vec<f64>> = serde_json::from_str(&body).unwrap();

    let window = adapter.window_from_rows(&parsed).unwrap();
    assert_eq!(
        adapter.transform(window.view()).unwrap(),
        builder.transform_one(epoch).unwrap()
    );
}

#[test]
fn epochs_never_straddle_concatenated_sessions() {
    let config = PipelineConfig::default();
    let first = recording(5_000, 22, vec![Annotation::new("769", 1000)]);
    let second = recording(
        5_000,
        22,
        vec![Annotation::new("770", 100), Annotation::new("771", 2000)],
    );
    let joined = Recording::concatenate(vec![first, second]).unwrap();
    assert_eq!(joined.segments(), &[0, 5000]);

    let dataset = OfflineBuilder::new(config).unwrap().build(&joined).unwrap();
    // The window of the event at 5100 starts at 4850, inside the boundary guard
    assert_eq!(dataset.onsets, vec![1000, 7000]);
    assert_eq!(dataset.labels, vec![0, 2]);
}

#[test]
fn dataset_file_keeps_parity_information() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("A01T.msgpack");
    let config = PipelineConfig::default();
    let rec = recording(6_000, 22, task_annotations());

    let dataset = OfflineBuilder::new(config.clone()).unwrap().build(&rec).unwrap();
    dataset.save(&path).unwrap();

    let loaded = Dataset::load(&path).unwrap();
    assert_eq!(loaded.x, dataset.x);
    assert_eq!(loaded.pipeline_fingerprint, config.fingerprint());
    assert!(loaded.verify_parity(&config).is_ok());
}

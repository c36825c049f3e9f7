//! Report statistics and export tests

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use memwatch::{
    ManualScheduler, MeasurementSession, Report, ReportRecord, SessionConfig, bytes_to_megabytes,
};
use proptest::prelude::*;

fn report_from(samples: Vec<u64>) -> Report {
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    Report::new(at, at, Duration::ZERO, 0, 0, samples)
}

proptest! {
    #[test]
    fn prop_min_average_max_are_ordered(samples in prop::collection::vec(any::<u64>(), 0..64)) {
        let report = report_from(samples.clone());

        prop_assert!(report.min() <= report.average());
        prop_assert!(report.average() <= report.max());

        if samples.is_empty() {
            prop_assert_eq!(report.min(), 0);
            prop_assert_eq!(report.average(), 0);
            prop_assert_eq!(report.max(), 0);
        }
    }

    #[test]
    fn prop_single_sample_is_every_statistic(sample in any::<u64>()) {
        let report = report_from(vec![sample]);

        prop_assert_eq!(report.min(), sample);
        prop_assert_eq!(report.average(), sample);
        prop_assert_eq!(report.max(), sample);
    }
}

#[test]
fn test_default_session_scenario() {
    let scheduler = ManualScheduler::new();
    let readings = [0_i64, 500, 1_000, 1_500, 2_000, 2_500];
    let next = std::sync::atomic::AtomicUsize::new(0);
    let memory = move || {
        let index = next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        readings.get(index).copied().unwrap_or(2_500)
    };
    let mut session = MeasurementSession::with_collaborators(
        SessionConfig::default(),
        Arc::new(memory),
        Arc::new(scheduler.clone()),
    );
    assert_eq!(session.sampling_period(), Duration::from_millis(10));

    session.start().unwrap();
    scheduler.tick_n(3);
    session.stop().unwrap();
    let report = session.get_report();

    assert_eq!(report.samples(), &[1_000, 1_500, 2_000]);
    assert_eq!(report.max(), 2_000);
    assert_eq!(report.min(), 1_000);
    assert_eq!(report.average(), 1_500);
    assert!((bytes_to_megabytes(2_000_000) - 2.0).abs() < f64::EPSILON);
}

#[test]
fn test_serialized_report_roundtrips_exactly() {
    let scheduler = ManualScheduler::new();
    let mut session = MeasurementSession::with_collaborators(
        SessionConfig::default(),
        Arc::new(|| 12_345_i64),
        Arc::new(scheduler.clone()),
    );

    session.start().unwrap();
    scheduler.tick_n(2);
    std::thread::sleep(Duration::from_millis(2));
    session.stop().unwrap();
    let report = session.get_report();

    let json = report.to_json_string().unwrap();
    let record = ReportRecord::from_json_str(&json).unwrap();

    assert_eq!(record.started_at, report.started_at());
    assert_eq!(record.stopped_at, report.stopped_at());
    assert_eq!(
        u128::from(record.elapsed),
        report.elapsed().as_micros()
    );
    assert_eq!(record.memory_before_start_bytes, 12_345);
    assert_eq!(record.memory_after_stop_bytes, 12_345);
    assert_eq!(record.memory_samples_bytes, vec![12_345, 12_345]);

    let restored = Report::from_record(record);
    assert_eq!(restored.elapsed().as_micros(), report.elapsed().as_micros());
    assert_eq!(restored.samples(), report.samples());
}

#[test]
fn test_timestamps_are_iso8601() {
    let json = report_from(vec![1]).to_json().unwrap();
    let started = json["started_at"].as_str().unwrap();

    assert_eq!(started, "2026-01-02T03:04:05Z");
    assert_eq!(
        chrono::DateTime::parse_from_rfc3339(started).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    );
}

#[test]
fn test_issued_report_survives_reset() {
    let scheduler = ManualScheduler::new();
    let mut session = MeasurementSession::with_collaborators(
        SessionConfig::default(),
        Arc::new(|| 777_i64),
        Arc::new(scheduler.clone()),
    );

    session.start().unwrap();
    scheduler.tick_n(4);
    session.stop().unwrap();
    let issued = session.get_report();

    session.reset();
    session.start().unwrap();
    scheduler.tick();

    assert_eq!(issued.samples(), &[777, 777, 777, 777]);
    assert_eq!(session.get_report().samples(), &[777]);
}

#[test]
fn test_in_progress_report_is_a_snapshot() {
    let scheduler = ManualScheduler::new();
    let mut session = MeasurementSession::with_collaborators(
        SessionConfig::default(),
        Arc::new(|| 64_i64),
        Arc::new(scheduler.clone()),
    );

    session.start().unwrap();
    scheduler.tick();
    let mid = session.get_report();
    scheduler.tick_n(2);

    assert_eq!(mid.samples(), &[64]);
    assert_eq!(session.get_report().sample_count(), 3);
    session.dispose();
}

#[test]
fn test_custom_converter_replaces_export() {
    let scheduler = ManualScheduler::new();
    let config = SessionConfig::default().with_report_converter(|report| {
        serde_json::json!({
            "peak_mb": bytes_to_megabytes(report.max()),
            "samples": report.sample_count(),
        })
    });
    let mut session = MeasurementSession::with_collaborators(
        config,
        Arc::new(|| 3_000_000_i64),
        Arc::new(scheduler.clone()),
    );

    session.start().unwrap();
    scheduler.tick();
    session.stop().unwrap();

    let json = session.get_report().to_json().unwrap();
    assert_eq!(json, serde_json::json!({ "peak_mb": 3.0, "samples": 1 }));
}

#[test]
fn test_report_serializes_through_serde() {
    let value = serde_json::to_value(report_from(vec![5, 6])).unwrap();
    assert_eq!(value["memory_samples_bytes"], serde_json::json!([5, 6]));
    assert_eq!(value["elapsed"], 0);
}

mod common;

use common::FakeExporter;
use music_library_exporter::error::{BeginExportError, ConfigurationError, ExportFailure};
use music_library_exporter::export::{
    ExportConfiguration, ExportDelegate, ExportEvent, ExportOutcome, ExportState, PlaylistSort,
    PlaylistSortColumn, PlaylistSortOrder,
};
use std::fs;
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> ExportConfiguration {
    ExportConfiguration::new(dir.path(), "Library.xml")
}

/// Wait for the attempt to enter `phase`
fn wait_for_phase(events: &Receiver<ExportEvent>, phase: ExportState) {
    loop {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(ExportEvent::PhaseChanged { to, .. }) if to == phase => return,
            Ok(_) => continue,
            Err(e) => panic!("never reached {}: {}", phase, e),
        }
    }
}

#[test]
fn test_export_writes_library_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let delegate = ExportDelegate::new(FakeExporter::new());

    let outcome = delegate
        .export_blocking(&config_in(&dir))
        .expect("Failed to start export");

    let destination = dir.path().join("Library.xml");
    assert_eq!(
        outcome,
        ExportOutcome::Finished {
            destination: destination.clone()
        }
    );
    assert!(destination.exists());
    assert!(fs::read_to_string(&destination).unwrap().contains("Blue Monday"));
    assert_eq!(delegate.current_state(), ExportState::Stopped);
}

#[test]
fn test_phase_events_arrive_in_order() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::new());
    let events = delegate.subscribe();

    delegate.export_blocking(&config_in(&dir)).unwrap();

    let seen: Vec<ExportEvent> = events.try_iter().collect();
    let phases: Vec<ExportState> = seen
        .iter()
        .filter_map(|event| match event {
            ExportEvent::PhaseChanged { to, .. } => Some(*to),
            ExportEvent::Completed(_) => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            ExportState::Preparing,
            ExportState::GeneratingTracks,
            ExportState::GeneratingPlaylists,
            ExportState::WritingToDisk,
            ExportState::Finished,
            ExportState::Stopped,
        ]
    );

    // Completion is announced while the attempt is still terminal
    let completed_at = seen
        .iter()
        .position(|event| matches!(event, ExportEvent::Completed(_)))
        .expect("no completion event");
    assert_eq!(completed_at, seen.len() - 2);
}

#[test]
fn test_second_begin_export_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (exporter, release) = FakeExporter::gated();
    let delegate = ExportDelegate::new(exporter);
    let events = delegate.subscribe();

    let handle = delegate.begin_export(&config_in(&dir)).unwrap();
    wait_for_phase(&events, ExportState::GeneratingTracks);

    let err = delegate.begin_export(&config_in(&dir)).unwrap_err();
    assert_eq!(
        err,
        BeginExportError::AlreadyRunning(ExportState::GeneratingTracks)
    );
    assert_eq!(delegate.current_state(), ExportState::GeneratingTracks);

    release.send(()).unwrap();
    assert!(handle.wait().is_success());
    assert_eq!(delegate.exporter().write_count(), 1);
}

#[test]
fn test_current_state_is_readable_from_another_thread() {
    let dir = TempDir::new().unwrap();
    let (exporter, release) = FakeExporter::gated();
    let delegate = ExportDelegate::new(exporter);
    let events = delegate.subscribe();

    let handle = delegate.begin_export(&config_in(&dir)).unwrap();
    wait_for_phase(&events, ExportState::GeneratingTracks);

    let observer = delegate.clone();
    let observed = std::thread::spawn(move || observer.current_state())
        .join()
        .unwrap();
    assert_eq!(observed, ExportState::GeneratingTracks);

    release.send(()).unwrap();
    handle.wait();
}

#[test]
fn test_next_export_after_finish_starts_from_preparing() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::new());

    assert!(delegate.export_blocking(&config_in(&dir)).unwrap().is_success());

    let events = delegate.subscribe();
    let handle = delegate.begin_export(&config_in(&dir)).unwrap();
    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        ExportEvent::PhaseChanged {
            from: ExportState::Stopped,
            to: ExportState::Preparing
        }
    );
    assert!(handle.wait().is_success());
    assert_eq!(delegate.exporter().write_count(), 2);
}

#[test]
fn test_custom_sort_configurations() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::new());

    let valid = config_in(&dir).with_sort(PlaylistSort::custom(
        PlaylistSortColumn::Title,
        PlaylistSortOrder::Ascending,
    ));
    assert!(delegate.export_blocking(&valid).unwrap().is_success());

    let events = delegate.subscribe();
    let invalid = config_in(&dir).with_sort(PlaylistSort::custom(
        PlaylistSortColumn::None,
        PlaylistSortOrder::None,
    ));
    let outcome = delegate.export_blocking(&invalid).unwrap();

    assert_eq!(
        outcome,
        ExportOutcome::Failed(ExportFailure::InvalidConfiguration(
            ConfigurationError::IncompleteCustomSort
        ))
    );
    let reached_tracks = events.try_iter().any(|event| {
        matches!(
            event,
            ExportEvent::PhaseChanged {
                to: ExportState::GeneratingTracks,
                ..
            }
        )
    });
    assert!(!reached_tracks);
    assert_eq!(delegate.exporter().write_count(), 1);
}

#[test]
fn test_playlist_failure_is_reported_with_phase() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::failing_at(
        ExportState::GeneratingPlaylists,
    ));

    let outcome = delegate.export_blocking(&config_in(&dir)).unwrap();

    assert_eq!(outcome.state(), ExportState::Error);
    assert_eq!(
        outcome.failure(),
        Some(&ExportFailure::ExporterFailure {
            phase: ExportState::GeneratingPlaylists,
            cause: "playlist folder loop detected".to_string(),
        })
    );
    assert_eq!(delegate.last_outcome(), Some(outcome));
    assert_eq!(delegate.current_state(), ExportState::Stopped);
}

#[test]
fn test_missing_output_directory_is_write_failure() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::new());
    let config = ExportConfiguration::new(dir.path().join("unmounted"), "Library.xml");

    let outcome = delegate.export_blocking(&config).unwrap();

    match outcome {
        ExportOutcome::Failed(ExportFailure::WriteFailure { destination, cause }) => {
            assert_eq!(destination, dir.path().join("unmounted/Library.xml"));
            assert!(cause.contains("Failed to write"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_completion_callback_receives_failure_reason() {
    let dir = TempDir::new().unwrap();
    let delegate = ExportDelegate::new(FakeExporter::failing_at(ExportState::GeneratingTracks));
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    delegate.on_completion(move |outcome| {
        let _ = tx.lock().unwrap().send(outcome.clone());
    });

    delegate.export_blocking(&config_in(&dir)).unwrap();

    let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(outcome.state(), ExportState::Error);
    assert!(matches!(
        outcome.failure(),
        Some(ExportFailure::ExporterFailure {
            phase: ExportState::GeneratingTracks,
            ..
        })
    ));
}

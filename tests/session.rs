//! End-to-end session tests: probe → manifest → allocation → assembly →
//! sink, driven through the public coordinator API against an in-memory
//! transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{MockTransport, read_stored_zip};
use volzip::{Coordinator, EngineConfig, Error, Outcome, SessionEvent, SessionState};

fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_single_volume_download_completes() {
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/r/img.tif", b"image bytes".to_vec())
            .body("http://x/r/img.json", b"{}".to_vec()),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    let outcome = coordinator
        .start(
            &strings(&["http://x/r/img.tif"]),
            &strings(&["http://x/r/img.json"]),
            &strings(&["/rec 1"]),
            "record.zip",
        )
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert!(!coordinator.is_downloading());

    let archive = std::fs::read(dir.path().join("record.zip")).unwrap();
    let entries = read_stored_zip(&archive);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "rec 1/img.tif");
    assert_eq!(entries[0].data, b"image bytes");
    assert_eq!(entries[1].name, "rec 1/img.json");

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::StateChanged {
        state: SessionState::Completed
    }));
    let (total, unknown) = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::SizeEstimated {
                bytes_total,
                unknown_files,
            } => Some((*bytes_total, *unknown_files)),
            _ => None,
        })
        .unwrap();
    assert_eq!(total, 13);
    assert_eq!(unknown, 0);
}

#[tokio::test]
async fn test_multi_volume_naming_and_split_notice() {
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/a", vec![1u8; 600])
            .body("http://x/a.json", vec![2u8; 10])
            .body("http://x/b", vec![3u8; 600])
            .body("http://x/b.json", vec![4u8; 10]),
    );
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new().volume_cap(1000);
    let (coordinator, mut events) = Coordinator::new(transport, config, dir.path());

    let outcome = coordinator
        .start(
            &strings(&["http://x/a", "http://x/b"]),
            &strings(&["http://x/a.json", "http://x/b.json"]),
            &strings(&["rec", "rec"]),
            "record.zip",
        )
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let first = read_stored_zip(&std::fs::read(dir.path().join("record-1of2.zip")).unwrap());
    let second = read_stored_zip(&std::fs::read(dir.path().join("record-2of2.zip")).unwrap());
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(first[0].name, "rec/a");
    assert_eq!(second[0].name, "rec/b");

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::SplitNotice {
        volume_count: 2,
        cap_bytes: 1000
    }));
}

#[tokio::test]
async fn test_companion_bundled_and_oversized_routed() {
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/scan_0001.ser", vec![5u8; 100])
            .body("http://x/scan_0001.json", vec![6u8; 10])
            .body("http://x/scan.emi", vec![7u8; 20])
            .body("http://x/huge.raw", vec![8u8; 5000])
            .body("http://x/huge.json", vec![9u8; 10]),
    );
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::new().volume_cap(1000);
    let (coordinator, mut events) = Coordinator::new(transport, config, dir.path());

    let outcome = coordinator
        .start(
            &strings(&["http://x/scan_0001.ser", "http://x/huge.raw"]),
            &strings(&["http://x/scan_0001.json", "http://x/huge.json"]),
            &strings(&["rec", "rec"]),
            "record.zip",
        )
        .await
        .unwrap();
    assert!(outcome.is_completed());

    // The archive holds the .ser, its metadata and the implied .emi.
    let archive = read_stored_zip(&std::fs::read(dir.path().join("record.zip")).unwrap());
    let names: Vec<&str> = archive.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["rec/scan_0001.ser", "rec/scan_0001.json", "rec/scan.emi"]);

    // The oversized file and its metadata were saved individually.
    assert_eq!(std::fs::read(dir.path().join("huge.raw")).unwrap(), vec![8u8; 5000]);
    assert_eq!(std::fs::read(dir.path().join("huge.json")).unwrap(), vec![9u8; 10]);

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::CompanionNotice { count: 1 }));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::OversizedNotice { filenames } if filenames.contains(&"huge.raw".to_string())
    )));
}

#[tokio::test]
async fn test_progress_is_monotonic_and_reaches_total() {
    let transport = Arc::new(
        MockTransport::new()
            .with_chunk_size(32)
            .body("http://x/a", vec![1u8; 300])
            .body("http://x/a.json", vec![2u8; 30]),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    coordinator
        .start(
            &strings(&["http://x/a"]),
            &strings(&["http://x/a.json"]),
            &strings(&["rec"]),
            "record.zip",
        )
        .await
        .unwrap();

    let mut last = 0;
    let mut final_total = 0;
    for event in drain(&mut events) {
        if let SessionEvent::Progress {
            bytes_delivered,
            bytes_total,
        } = event
        {
            assert!(bytes_delivered >= last, "progress went backwards");
            assert!(bytes_delivered <= bytes_total);
            last = bytes_delivered;
            final_total = bytes_total;
        }
    }
    assert_eq!(final_total, 330);
    assert_eq!(last, 330);
}

#[tokio::test]
async fn test_second_start_fails_fast_while_running() {
    let transport = Arc::new(
        MockTransport::new()
            .with_delay_per_chunk(Duration::from_millis(30))
            .body("http://x/a", vec![1u8; 256])
            .body("http://x/a.json", vec![2u8; 16]),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());
    let coordinator = Arc::new(coordinator);

    let background = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .start(
                    &strings(&["http://x/a"]),
                    &strings(&["http://x/a.json"]),
                    &strings(&["rec"]),
                    "record.zip",
                )
                .await
        })
    };

    // Give the first session time to take the single-flight slot.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(coordinator.is_downloading());

    let err = coordinator
        .start(
            &strings(&["http://x/a"]),
            &strings(&["http://x/a.json"]),
            &strings(&["rec"]),
            "other.zip",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyInProgress));

    // The running session is unaffected and finishes normally.
    let outcome = background.await.unwrap().unwrap();
    assert!(outcome.is_completed());
}

#[tokio::test]
async fn test_cancellation_keeps_partial_output() {
    let transport = Arc::new(
        MockTransport::new()
            .with_chunk_size(16)
            .with_delay_per_chunk(Duration::from_millis(20))
            .body("http://x/a", vec![1u8; 4096])
            .body("http://x/a.json", vec![2u8; 16]),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());
    let coordinator = Arc::new(coordinator);

    let background = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .start(
                    &strings(&["http://x/a"]),
                    &strings(&["http://x/a.json"]),
                    &strings(&["rec"]),
                    "record.zip",
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(120)).await;
    coordinator.cancel();

    let outcome = background.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Cancelled));
    assert!(!coordinator.is_downloading());

    // Whatever was durably written before the signal stays on disk.
    assert!(dir.path().join("record.zip").exists());

    // Delivery stopped at the signal: no progress report follows the
    // terminal state transition.
    let mut terminal_seen = false;
    for event in drain(&mut events) {
        match event {
            SessionEvent::StateChanged { state } if state.is_terminal() => terminal_seen = true,
            SessionEvent::Progress { .. } => {
                assert!(!terminal_seen, "bytes delivered after cancellation");
            }
            _ => {}
        }
    }
    assert!(terminal_seen);
}

#[tokio::test]
async fn test_failed_entry_fails_the_session() {
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/a", vec![1u8; 64])
            .body("http://x/a.json", vec![2u8; 8])
            .truncated("http://x/a", 32),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, mut events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    let outcome = coordinator
        .start(
            &strings(&["http://x/a"]),
            &strings(&["http://x/a.json"]),
            &strings(&["rec"]),
            "record.zip",
        )
        .await
        .unwrap();
    match outcome {
        Outcome::Failed(Error::ArchiveRead { path, .. }) => assert_eq!(path, "rec/a"),
        other => panic!("expected ArchiveRead failure, got {other:?}"),
    }
    assert!(!coordinator.is_downloading());

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::StateChanged {
        state: SessionState::Failed
    }));
}

#[tokio::test]
async fn test_mismatched_input_fails_before_network() {
    // No URLs registered: any probe would error loudly, but validation
    // must reject the input before the transport is ever touched.
    let transport = Arc::new(MockTransport::new());
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    let err = coordinator
        .start(
            &strings(&["http://x/a", "http://x/b"]),
            &strings(&["http://x/a.json"]),
            &strings(&["rec"]),
            "record.zip",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ManifestInput(_)));
    assert!(coordinator.size_cache().is_empty());
    assert!(!coordinator.is_downloading());
}

#[tokio::test]
async fn test_estimate_reports_caveats_and_companions() {
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/scan_0001.ser", vec![1u8; 500])
            .body("http://x/scan_0001.json", vec![2u8; 50])
            .body("http://x/scan.emi", vec![3u8; 25])
            .failing_probe("http://x/flaky.raw"),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    let estimate = coordinator
        .estimate(
            &strings(&["http://x/scan_0001.ser", "http://x/flaky.raw"]),
            &strings(&["http://x/scan_0001.json", "http://x/scan_0001.json"]),
        )
        .await;

    // The companion is counted into the total even though it was never
    // listed; the failed probe is a caveat, not an error.
    assert_eq!(estimate.bytes_total, 575);
    assert_eq!(estimate.unknown_files, 1);
    assert_eq!(estimate.companion_count, 1);
}

#[tokio::test]
async fn test_shared_file_downloaded_once() {
    // Two selection rows referencing the same content file (multi-signal
    // dataset): the archive contains it exactly once.
    let transport = Arc::new(
        MockTransport::new()
            .body("http://x/shared.ser", vec![1u8; 100])
            .body("http://x/sig1.json", vec![2u8; 10])
            .body("http://x/sig2.json", vec![3u8; 10]),
    );
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _events) =
        Coordinator::new(transport, EngineConfig::default(), dir.path());

    let outcome = coordinator
        .start(
            &strings(&["http://x/shared.ser", "http://x/shared.ser"]),
            &strings(&["http://x/sig1.json", "http://x/sig1.json"]),
            &strings(&["rec", "rec"]),
            "record.zip",
        )
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let archive = read_stored_zip(&std::fs::read(dir.path().join("record.zip")).unwrap());
    let count = archive
        .iter()
        .filter(|e| e.name == "rec/shared.ser")
        .count();
    assert_eq!(count, 1);
    assert_eq!(archive.len(), 2);
}

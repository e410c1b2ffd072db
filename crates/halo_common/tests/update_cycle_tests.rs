//! Update cycle tests: idempotent retry, checksum gate, ledger policy
//!
//! Drives `UpdateCycle` against an in-memory update server and a device
//! tree in a temp dir.

mod common;

use common::*;
use halo_common::coop::NoYield;
use halo_common::download::Downloader;
use halo_common::error::DownloadError;
use halo_common::{CycleOutcome, ErrorKind, IncompatibleLedger};
use tempfile::TempDir;

fn server_with(production: serde_json::Value, zips: &[(&str, Vec<u8>)]) -> FakeServer {
    let mut server = FakeServer::new().serve(MANIFEST_URL, manifest_json(production, vec![]));
    for (version, zip) in zips {
        server.replace(&archive_url(version), zip.clone());
    }
    server
}

#[test]
fn test_no_eligible_release_leaves_state_unchanged() {
    let device = Device::new("0.7.0");
    let zip = release_zip("0.7.0", None);
    let server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[("0.7.0", zip.clone())]);

    let before = device.snapshot();
    assert_eq!(device.cycle(&server), CycleOutcome::NoUpdate);
    assert_eq!(device.cycle(&server), CycleOutcome::NoUpdate);

    assert_eq!(device.snapshot(), before, "cycle must not touch the device");
    assert_eq!(server.downloads(), 0);
}

#[test]
fn test_staged_release_is_not_downloaded_twice() {
    let device = Device::new("0.6.0");
    let zip = release_zip("0.7.0", Some("0.6.0"));
    let server = server_with(
        descriptor("0.7.0", Some("0.6.0"), "2026-03-01", &zip),
        &[("0.7.0", zip.clone())],
    );

    let staged = CycleOutcome::Staged {
        version: "0.7.0".into(),
    };
    assert_eq!(device.cycle(&server), staged);
    assert!(device.layout.pending_ready().exists());
    assert!(!device.layout.pending_archive().exists(), "zip is removed after staging");
    let after_first = device.snapshot();

    assert_eq!(device.cycle(&server), staged);
    assert_eq!(server.downloads(), 1);
    assert_eq!(device.snapshot(), after_first);
}

#[test]
fn test_corrupted_download_is_marked_and_not_retried() {
    let device = Device::new("0.6.0");

    let mut files = release_files("0.7.0", None);
    files.push(("assets/blob.bin".into(), noise(50_000, 7)));
    let zip = zip_bytes(&files);
    assert!(zip.len() > 50_000);

    let mut corrupted = zip.clone();
    let mid = corrupted.len() / 2;
    corrupted[mid] ^= 0x01;
    let server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[("0.7.0", corrupted)]);

    let outcome = device.cycle(&server);
    assert!(
        matches!(
            outcome,
            CycleOutcome::Failed {
                kind: ErrorKind::Integrity,
                marked_incompatible: true,
                ..
            }
        ),
        "unexpected outcome {:?}",
        outcome
    );
    assert!(!device.layout.pending_dir().exists());
    assert!(IncompatibleLedger::load(&device.layout.ledger()).contains("0.7.0"));

    // The ledger stops the retry storm.
    assert_eq!(device.cycle(&server), CycleOutcome::NoUpdate);
    assert_eq!(server.downloads(), 1);
    assert_eq!(device.version(), "0.6.0");
}

#[test]
fn test_missing_archive_marks_release() {
    let device = Device::new("0.6.0");
    let zip = release_zip("0.7.0", None);
    let server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[]);

    let outcome = device.cycle(&server);
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            kind: ErrorKind::ArchiveFetch,
            marked_incompatible: true,
            ..
        }
    ));
    assert!(!device.layout.pending_dir().exists());
}

#[test]
fn test_unreachable_manifest_keeps_staged_update() {
    let device = Device::new("0.6.0");
    let zip = release_zip("0.7.0", None);
    let mut server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[("0.7.0", zip.clone())]);
    assert!(matches!(device.cycle(&server), CycleOutcome::Staged { .. }));

    server.replace(MANIFEST_URL, b"<html>maintenance</html>".to_vec());
    let outcome = device.cycle(&server);
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            kind: ErrorKind::Transport,
            marked_incompatible: false,
            ..
        }
    ));
    assert!(device.layout.pending_ready().exists());
    assert!(IncompatibleLedger::load(&device.layout.ledger()).is_empty());
}

#[test]
fn test_package_version_must_match_release() {
    let device = Device::new("0.6.0");
    let zip = release_zip("0.8.0", None);
    let server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[("0.7.0", zip.clone())]);

    let outcome = device.cycle(&server);
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            kind: ErrorKind::Integrity,
            ..
        }
    ));
    assert!(!device.layout.pending_dir().exists());
}

#[test]
fn test_archive_without_critical_files_is_rejected() {
    let device = Device::new("0.6.0");
    let files: Vec<_> = release_files("0.7.0", None)
        .into_iter()
        .filter(|(name, _)| name != "certs/ca-bundle.pem")
        .collect();
    let zip = zip_bytes(&files);
    let server = server_with(descriptor("0.7.0", None, "2026-03-01", &zip), &[("0.7.0", zip.clone())]);

    let outcome = device.cycle(&server);
    assert!(matches!(
        outcome,
        CycleOutcome::Failed {
            kind: ErrorKind::Integrity,
            marked_incompatible: true,
            ..
        }
    ));
    assert!(!device.layout.pending_dir().exists());
}

#[test]
fn test_every_single_byte_flip_fails_checksum() {
    let tmp = TempDir::new().unwrap();
    let payload = noise(300, 11);
    let expected = sha256_hex(&payload);
    let dest = tmp.path().join("update.zip");

    for i in 0..payload.len() {
        let mut flipped = payload.clone();
        flipped[i] ^= 0x80;
        let server = FakeServer::new().serve("https://updates.test/p.zip", flipped);
        let downloader = Downloader::new(&server, &NoYield)
            .with_free_space_probe(|_| Ok(u64::MAX / 2));

        let result = downloader.download("https://updates.test/p.zip", &expected, &dest);
        assert!(
            matches!(result, Err(DownloadError::ChecksumMismatch { .. })),
            "flip at byte {} was accepted",
            i
        );
        assert!(!dest.exists(), "partial file left after flip at {}", i);
    }

    let server = FakeServer::new().serve("https://updates.test/p.zip", payload.clone());
    let downloader = Downloader::new(&server, &NoYield).with_free_space_probe(|_| Ok(u64::MAX / 2));
    let summary = downloader
        .download("https://updates.test/p.zip", &expected.to_uppercase(), &dest)
        .unwrap();
    assert_eq!(summary.bytes, payload.len() as u64);
}

// End-to-end update cycles against a local HTTP server and a real
// file-backed slot. Only the device restart is simulated.

use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use ota_agent::config::AgentConfig;
use ota_agent::network::connectivity::NetworkProbe;
use ota_agent::network::transport::HttpTransport;
use ota_agent::ota::manager::{CycleOutcome, UpdateError, UpdateManager, UpdateState};
use ota_agent::ota::writer::FileSlotWriter;
use ota_agent::version::FirmwareVersion;

const TOKEN: &str = "secret-token";

fn agent_config(server_url: &str, current: &str, slot_dir: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.version_url = format!("{server_url}/version");
    config.firmware_url = format!("{server_url}/firmware");
    config.auth_token = TOKEN.to_string();
    config.current_version = current.to_string();
    config.slot_dir = slot_dir.to_path_buf();
    config
}

fn http_stack(config: &AgentConfig) -> (NetworkProbe, HttpTransport) {
    let probe = NetworkProbe::from_url(&config.version_url, Duration::from_secs(2)).unwrap();
    let transport = HttpTransport::new(Duration::from_secs(5), Duration::from_secs(5)).unwrap();
    (probe, transport)
}

fn manifest_body(version: &str, image: &[u8]) -> String {
    let checksum = format!("{:x}", Sha256::digest(image));
    format!(r#"{{"version":"{version}","checksum":"{checksum}"}}"#)
}

fn mock_version(server: &mut mockito::Server, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/version")
        .match_header("authorization", TOKEN)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create()
}

fn mock_firmware(server: &mut mockito::Server, image: &[u8]) -> mockito::Mock {
    server
        .mock("GET", "/firmware")
        .match_header("authorization", TOKEN)
        .with_status(200)
        .with_header("content-type", "application/octet-stream")
        .with_body(image)
        .create()
}

#[test]
fn newer_release_is_downloaded_verified_and_staged() {
    let image: Vec<u8> = (0u8..=255).cycle().take(10_000).collect();

    let mut server = mockito::Server::new();
    let version_mock = mock_version(&mut server, &manifest_body("1.2.0", &image));
    let firmware_mock = mock_firmware(&mut server, &image);

    let slot = tempfile::tempdir().unwrap();
    let config = agent_config(&server.url(), "1.1.2", slot.path());
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);
    let image_path = writer.image_path();

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();
    let outcome = manager.check_and_update();

    match outcome {
        CycleOutcome::Rebooting { new_version } => {
            assert_eq!(new_version, FirmwareVersion::new(1, 2, 0));
        }
        other => panic!("expected reboot, got {other:?}"),
    }
    assert_eq!(manager.state(), UpdateState::Rebooting);
    assert_eq!(std::fs::read(&image_path).unwrap(), image);

    // Waiting for restart now; the cadence gate stays shut.
    assert!(manager
        .poll(Instant::now() + Duration::from_secs(3600))
        .is_none());

    version_mock.assert();
    firmware_mock.assert();
}

#[test]
fn matching_version_downloads_nothing() {
    let mut server = mockito::Server::new();
    let version_mock = mock_version(&mut server, &manifest_body("1.1.2", b""));
    let firmware_mock = server
        .mock("GET", "/firmware")
        .expect(0)
        .with_status(200)
        .create();

    let slot = tempfile::tempdir().unwrap();
    let config = agent_config(&server.url(), "1.1.2", slot.path());
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);
    let image_path = writer.image_path();

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();
    assert!(matches!(manager.check_and_update(), CycleOutcome::NoUpdate));
    assert_eq!(manager.state(), UpdateState::Idle);
    assert!(!image_path.exists());

    version_mock.assert();
    firmware_mock.assert();
}

#[test]
fn corrupted_download_changes_nothing_and_next_cycle_succeeds() {
    let image: Vec<u8> = (1u8..=200).cycle().take(40_000).collect();
    let mut tampered = image.clone();
    tampered[1234] ^= 0xFF;

    let mut server = mockito::Server::new();
    mock_version(&mut server, &manifest_body("1.2.0", &image));
    mock_firmware(&mut server, &tampered);

    let slot = tempfile::tempdir().unwrap();
    let config = agent_config(&server.url(), "1.1.2", slot.path());
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);
    let image_path = writer.image_path();

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();

    let outcome = manager.check_and_update();
    assert!(matches!(
        outcome,
        CycleOutcome::Failed(UpdateError::ChecksumMismatch { .. })
    ));
    // The device keeps running what it had.
    assert!(!image_path.exists());
    assert_eq!(manager.current_version(), FirmwareVersion::new(1, 1, 2));
    assert_eq!(manager.state(), UpdateState::Idle);

    // The server's copy is fixed; the next cycle is unaffected by the
    // earlier failure.
    server.reset();
    mock_version(&mut server, &manifest_body("1.2.0", &image));
    mock_firmware(&mut server, &image);

    assert!(matches!(
        manager.check_and_update(),
        CycleOutcome::Rebooting { .. }
    ));
    assert_eq!(std::fs::read(&image_path).unwrap(), image);
}

#[test]
fn rejected_token_stops_the_cycle_before_any_download() {
    let mut server = mockito::Server::new();
    let version_mock = server
        .mock("GET", "/version")
        .match_header("authorization", "wrong-token")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"unauthorized"}"#)
        .create();
    let firmware_mock = server
        .mock("GET", "/firmware")
        .expect(0)
        .with_status(200)
        .create();

    let slot = tempfile::tempdir().unwrap();
    let mut config = agent_config(&server.url(), "1.1.2", slot.path());
    config.auth_token = "wrong-token".to_string();
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();
    let outcome = manager.check_and_update();

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(UpdateError::MetadataFetchFailed(401))
    ));
    version_mock.assert();
    firmware_mock.assert();
}

#[test]
fn image_larger_than_the_slot_is_refused() {
    let image = vec![0xEEu8; 8192];

    let mut server = mockito::Server::new();
    mock_version(&mut server, &manifest_body("1.2.0", &image));
    mock_firmware(&mut server, &image);

    let slot = tempfile::tempdir().unwrap();
    let mut config = agent_config(&server.url(), "1.1.2", slot.path());
    config.slot_capacity_bytes = 1024;
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);
    let image_path = writer.image_path();

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();
    let outcome = manager.check_and_update();

    match outcome {
        CycleOutcome::Failed(UpdateError::InsufficientSpace(e)) => {
            assert_eq!(e.required, 8192);
            assert_eq!(e.available, 1024);
        }
        other => panic!("expected insufficient space, got {other:?}"),
    }
    assert!(!image_path.exists());
}

#[test]
fn unreachable_server_skips_the_cycle() {
    // Bind then drop to get a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let slot = tempfile::tempdir().unwrap();
    let config = agent_config(&dead_url, "1.1.2", slot.path());
    let (probe, transport) = http_stack(&config);
    let writer = FileSlotWriter::new(slot.path(), config.slot_capacity_bytes);

    let mut manager = UpdateManager::new(config, probe, transport, writer).unwrap();
    let outcome = manager.check_and_update();

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(UpdateError::NetworkUnavailable)
    ));
    assert_eq!(manager.state(), UpdateState::Idle);
}

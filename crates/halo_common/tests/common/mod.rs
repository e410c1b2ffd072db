//! Shared fixtures: device tree builder, in-memory update server, ZIP builder

#![allow(dead_code)]

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

use halo_common::boot::BootContext;
use halo_common::coop::NoYield;
use halo_common::error::TransportError;
use halo_common::recovery::create_recovery_backup;
use halo_common::scripts::ScriptRegistry;
use halo_common::stage::stage;
use halo_common::storage::FsStatePort;
use halo_common::transport::{Transport, TransportResponse};
use halo_common::{
    run_boot_sequence, BootReport, CycleOutcome, DeviceLayout, DeviceSettings,
    IncompatibleLedger, UpdateCycle, CRITICAL_FILES,
};

pub const MACHINE: &str = "halo_s3_v1";
pub const OS_TARGET: &str = "circuitpython_10_1";
pub const MANIFEST_URL: &str = "https://updates.test/releases.json";

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Deterministic filler bytes that do not compress well.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x & 0xFF) as u8
        })
        .collect()
}

/// ZIP with every entry deflated.
pub fn zip_bytes(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data) in files {
        let mut crc = Crc::new();
        crc.update(data);
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        let payload = enc.finish().unwrap();

        let offset = out.len() as u32;
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&[20, 0, 0, 0]);
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&crc.sum().to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&payload);

        central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        central.extend_from_slice(&[20, 0, 20, 0, 0, 0]);
        central.extend_from_slice(&8u16.to_le_bytes());
        central.extend_from_slice(&[0, 0, 0, 0]);
        central.extend_from_slice(&crc.sum().to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 12]);
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(files.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

pub fn settings_toml(version: &str) -> String {
    format!(
        "version = \"{}\"\nmanifest_url = \"{}\"\nmachine_type = \"{}\"\nos_version = \"circuitpython_10_1_4\"\n",
        version, MANIFEST_URL, MACHINE
    )
}

pub fn package_manifest(version: &str, minimum_prior: Option<&str>) -> Value {
    let mut pkg = json!({
        "schema_version": "1.0.0",
        "version": version,
        "target_machine_types": [MACHINE],
        "target_operating_systems": [OS_TARGET],
        "release_type": "production",
    });
    if let Some(mpv) = minimum_prior {
        pkg["minimum_prior_version"] = json!(mpv);
    }
    pkg
}

/// Complete firmware tree for `version`, as relative path -> contents.
pub fn release_files(version: &str, minimum_prior: Option<&str>) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    for rel in CRITICAL_FILES {
        let content = match *rel {
            "settings.toml" => settings_toml(version).into_bytes(),
            "manifest.json" => package_manifest(version, minimum_prior).to_string().into_bytes(),
            other => format!("{} for {}", other, version).into_bytes(),
        };
        files.push((rel.to_string(), content));
    }
    files.push(("app/main.py".to_string(), format!("app {}", version).into_bytes()));
    files
}

pub fn release_zip(version: &str, minimum_prior: Option<&str>) -> Vec<u8> {
    zip_bytes(&release_files(version, minimum_prior))
}

pub fn archive_url(version: &str) -> String {
    format!("https://updates.test/halo-{}.zip", version)
}

pub fn descriptor(version: &str, minimum_prior: Option<&str>, date: &str, zip: &[u8]) -> Value {
    let mut d = json!({
        "version": version,
        "archive_url": archive_url(version),
        "sha256": sha256_hex(zip),
        "release_date": date,
    });
    if let Some(mpv) = minimum_prior {
        d["minimum_prior_version"] = json!(mpv);
    }
    d
}

pub fn manifest_json(production: Value, archive: Vec<Value>) -> Vec<u8> {
    json!({
        "schema_version": "1.0.0",
        "releases": [{
            "target_machine_types": [MACHINE],
            "target_operating_systems": [OS_TARGET],
            "production": production,
            "archive": archive,
        }]
    })
    .to_string()
    .into_bytes()
}

/// In-memory update server. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeServer {
    files: HashMap<String, Vec<u8>>,
    pub requests: RefCell<Vec<String>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, body: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), body);
        self
    }

    pub fn replace(&mut self, url: &str, body: Vec<u8>) {
        self.files.insert(url.to_string(), body);
    }

    pub fn downloads(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|u| u.as_str() != MANIFEST_URL)
            .count()
    }
}

impl Transport for FakeServer {
    fn get(&self, url: &str, _headers: &[(String, String)]) -> Result<TransportResponse, TransportError> {
        self.requests.borrow_mut().push(url.to_string());
        match self.files.get(url) {
            Some(body) => Ok(TransportResponse {
                content_length: Some(body.len() as u64),
                body: Box::new(Cursor::new(body.clone())),
            }),
            None => Err(TransportError::Status {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

fn plenty_of_space(_: &Path) -> std::io::Result<u64> {
    Ok(u64::MAX / 2)
}

/// Device root in a temp dir with an installed release and its backup.
pub struct Device {
    _tmp: TempDir,
    pub layout: DeviceLayout,
}

impl Device {
    pub fn new(version: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let layout = DeviceLayout::new(tmp.path());
        for (rel, content) in release_files(version, None) {
            let path = layout.path(&rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::write(layout.secrets(), r#"{"location_tag": "test-bench"}"#).unwrap();
        create_recovery_backup(&layout, version).unwrap();
        Self { _tmp: tmp, layout }
    }

    pub fn version(&self) -> String {
        DeviceSettings::load(&self.layout.settings()).version
    }

    pub fn state(&self) -> FsStatePort {
        FsStatePort::new(self.layout.clone())
    }

    pub fn boot(&self) -> BootReport {
        self.boot_with(&ScriptRegistry::new())
    }

    pub fn boot_with(&self, registry: &ScriptRegistry) -> BootReport {
        let mut state = self.state();
        let ctx = BootContext::new(self.layout.clone(), &mut state, registry, &NoYield);
        run_boot_sequence(ctx)
    }

    /// Stage an archive directly, bypassing download.
    pub fn stage_zip(&self, zip: &[u8]) {
        let archive = self.layout.pending_archive();
        fs::create_dir_all(archive.parent().unwrap()).unwrap();
        fs::write(&archive, zip).unwrap();
        stage(&archive, &self.layout, &NoYield).unwrap();
    }

    pub fn ledger(&self) -> IncompatibleLedger {
        IncompatibleLedger::load(&self.layout.ledger())
    }

    /// Snapshot without the pending directory.
    pub fn firmware_snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.snapshot()
            .into_iter()
            .filter(|(rel, _)| !rel.starts_with("pending_update"))
            .collect()
    }

    pub fn cycle(&self, server: &FakeServer) -> CycleOutcome {
        let mut state = self.state();
        UpdateCycle::new(self.layout.clone(), server, &NoYield, &mut state)
            .with_free_space_probe(plenty_of_space)
            .run()
    }

    /// Every file under the root except the append-only logs.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let root = self.layout.root();
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(root).ok()?.to_string_lossy().into_owned();
                if rel.ends_with("_log.txt") {
                    return None;
                }
                Some((rel, fs::read(e.path()).ok()?))
            })
            .collect()
    }
}

//! Release manifest fetch.

use std::io::Read;
use tracing::debug;

use crate::config::{DeviceSettings, Secrets};
use crate::device::DeviceIdentity;
use crate::error::TransportError;
use crate::manifest::Manifest;
use crate::transport::Transport;

/// Manifests are small; anything larger is a misconfigured endpoint.
const MAX_MANIFEST_BYTES: u64 = 256 * 1024;

/// `Halo/<version> (<machine>; <os>; LOC:<tag>)`
pub fn user_agent(identity: &DeviceIdentity, location_tag: &str) -> String {
    format!(
        "Halo/{} ({}; {}; LOC:{})",
        identity.current_firmware_version, identity.machine_type, identity.os_version, location_tag
    )
}

/// Headers sent with every update request.
pub fn request_headers(identity: &DeviceIdentity, secrets: &Secrets) -> Vec<(String, String)> {
    vec![
        (
            "User-Agent".to_string(),
            user_agent(identity, &secrets.location_tag),
        ),
        ("Connection".to_string(), "close".to_string()),
    ]
}

pub struct ManifestClient<'a> {
    transport: &'a dyn Transport,
    url: String,
    headers: Vec<(String, String)>,
}

impl<'a> ManifestClient<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        settings: &DeviceSettings,
        identity: &DeviceIdentity,
        secrets: &Secrets,
    ) -> Self {
        Self {
            transport,
            url: settings.manifest_url.clone(),
            headers: request_headers(identity, secrets),
        }
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn fetch(&self) -> Result<Manifest, TransportError> {
        debug!("Fetching manifest from {}", self.url);
        let response = self.transport.get(&self.url, &self.headers)?;

        let mut body = String::new();
        response
            .body
            .take(MAX_MANIFEST_BYTES + 1)
            .read_to_string(&mut body)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        if body.len() as u64 > MAX_MANIFEST_BYTES {
            return Err(TransportError::Decode(format!(
                "manifest exceeds {} bytes",
                MAX_MANIFEST_BYTES
            )));
        }

        Manifest::from_json(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

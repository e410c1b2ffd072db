//! HTTP transport
//!
//! The engine only needs "GET a URL with headers and stream the body".
//! `HttpTransport` does that over `reqwest::blocking`; tests supply an
//! in-memory implementation.

use std::io::Read;
use std::time::Duration;

use crate::error::TransportError;

/// Streaming response body.
pub struct TransportResponse {
    pub body: Box<dyn Read + Send>,
    pub content_length: Option<u64>,
}

pub trait Transport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, headers: &[(String, String)]) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(TransportResponse {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}

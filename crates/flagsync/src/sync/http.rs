//! HTTP transport for snapshots and the delta stream.
//!
//! Snapshots are a single JSON [`ConfigBatch`]. The delta stream is a
//! long-lived response carrying one JSON batch per line.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use log::debug;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};

use super::error::{Result, SourceError};
use super::source::{DeltaSource, DeltaStream, SnapshotSource};
use crate::model::{ConfigBatch, Origin};

/// Connect timeout for every request.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Whole-request timeout for snapshot fetches. The stream has none.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic-auth user name; the API key travels as the password.
const AUTH_USER: &str = "authuser";

fn create_http_client(request_timeout: Option<Duration>) -> Result<Client> {
    let mut builder = Client::builder().connect_timeout(DEFAULT_CONNECT_TIMEOUT);
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| SourceError::Http {
        url: String::new(),
        message: format!("Failed to create HTTP client: {}", e),
    })
}

fn base_url(url: &str) -> Result<String> {
    Url::parse(url).map_err(|e| SourceError::NotConfigured(format!("{}: {}", url, e)))?;
    Ok(url.trim_end_matches('/').to_string())
}

/// Fetches snapshots from the edge cache or from the API.
pub struct HttpSnapshotSource {
    client: Client,
    base_url: String,
    api_key: SecretString,
    origin: Origin,
}

impl HttpSnapshotSource {
    /// Edge-cached snapshot. The edge only serves the full set, so the
    /// version cursor is not sent.
    pub fn cdn(cdn_url: &str, api_key: &SecretString) -> Result<Self> {
        Self::new(cdn_url, api_key, Origin::SnapshotCdn)
    }

    /// Snapshot from the authoritative service, starting after a version.
    pub fn api(api_url: &str, api_key: &SecretString) -> Result<Self> {
        Self::new(api_url, api_key, Origin::SnapshotApi)
    }

    fn new(url: &str, api_key: &SecretString, origin: Origin) -> Result<Self> {
        Ok(Self {
            client: create_http_client(Some(DEFAULT_REQUEST_TIMEOUT))?,
            base_url: base_url(url)?,
            api_key: SecretString::from(api_key.expose_secret()),
            origin,
        })
    }

    /// URL fetched for a given cursor.
    pub fn snapshot_url(&self, since_version: i64) -> String {
        let since = match self.origin {
            Origin::SnapshotCdn => 0,
            _ => since_version,
        };
        format!("{}/api/v1/configs/{}", self.base_url, since)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn origin(&self) -> Origin {
        self.origin
    }

    async fn fetch_snapshot(&self, since_version: i64) -> Result<ConfigBatch> {
        let url = self.snapshot_url(since_version);
        debug!("Fetching snapshot from {}", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(AUTH_USER, Some(self.api_key.expose_secret()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response.json::<ConfigBatch>().await.map_err(|e| SourceError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

/// Subscribes to the newline-delimited JSON delta stream of the API.
pub struct HttpDeltaSource {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpDeltaSource {
    pub fn new(api_url: &str, api_key: &SecretString) -> Result<Self> {
        Ok(Self {
            client: create_http_client(None)?,
            base_url: base_url(api_url)?,
            api_key: SecretString::from(api_key.expose_secret()),
        })
    }

    pub fn stream_url(&self, since_version: i64) -> String {
        format!(
            "{}/api/v1/configs/stream?start_at_id={}",
            self.base_url, since_version
        )
    }
}

#[async_trait]
impl DeltaSource for HttpDeltaSource {
    async fn subscribe(&self, since_version: i64) -> Result<DeltaStream> {
        let url = self.stream_url(since_version);
        debug!("Subscribing to delta stream at {}", url);

        let response = self
            .client
            .get(&url)
            .basic_auth(AUTH_USER, Some(self.api_key.expose_secret()))
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        Ok(ndjson_batches(url, Box::pin(response.bytes_stream())))
    }
}

struct LineReader<S> {
    body: S,
    buffer: Vec<u8>,
    url: String,
    finished: bool,
}

/// Splits a chunked body into lines and decodes each non-blank line as a
/// batch. A transport error is yielded once, then the stream ends.
pub fn ndjson_batches<S, B>(url: String, body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let reader = LineReader {
        body,
        buffer: Vec::new(),
        url,
        finished: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(pos) = reader.buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = reader.buffer.drain(..=pos).collect();
                if let Some(item) = decode_line(&reader.url, &line) {
                    return Some((item, reader));
                }
                continue;
            }

            if reader.finished {
                let rest = std::mem::take(&mut reader.buffer);
                return decode_line(&reader.url, &rest).map(|item| (item, reader));
            }

            match reader.body.next().await {
                Some(Ok(chunk)) => reader.buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    reader.finished = true;
                    reader.buffer.clear();
                    return Some((Err(SourceError::from(e)), reader));
                }
                None => reader.finished = true,
            }
        }
    })
    .boxed()
}

fn decode_line(url: &str, line: &[u8]) -> Option<Result<ConfigBatch>> {
    let text = std::str::from_utf8(line).ok().map(str::trim);
    match text {
        Some("") => None,
        Some(text) => Some(
            serde_json::from_str::<ConfigBatch>(text).map_err(|e| SourceError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            }),
        ),
        None => Some(Err(SourceError::Decode {
            url: url.to_string(),
            message: "stream line is not valid UTF-8".to_string(),
        })),
    }
}

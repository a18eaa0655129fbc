//! Highlight side-channel
//!
//! A highlight trigger fires a best-effort HTTP POST against a REST endpoint
//! derived from the socket URL, and plays a local confirmation sound through
//! the same output path as server audio. Neither touches streaming state;
//! failures are logged and forgotten.

use crate::{LumaError, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const BOOKMARK_PATH: &str = "/api/bookmark";
const BOOKMARK_TIMEOUT: Duration = Duration::from_secs(30);

/// Derive the bookmark REST endpoint from the socket URL: same host, scheme
/// mapped ws→http / wss→https, fixed path, query stripped.
pub fn bookmark_endpoint(ws_url: &Url) -> Result<Url> {
    let mut endpoint = ws_url.clone();
    let scheme = match ws_url.scheme() {
        "ws" => "http",
        "wss" => "https",
        other => other,
    };
    endpoint
        .set_scheme(scheme)
        .map_err(|_| LumaError::SignalError(format!("cannot map scheme {}", ws_url.scheme())))?;
    endpoint.set_path(BOOKMARK_PATH);
    endpoint.set_query(None);
    Ok(endpoint)
}

#[derive(Debug, Serialize)]
struct BookmarkBody {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

/// Fire-and-forget bookmark signal bound to one session
pub struct SessionSignal {
    client: reqwest::Client,
    endpoint: Option<Url>,
    session_id: Option<String>,
}

impl SessionSignal {
    pub fn new(ws_url: &Url, session_id: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BOOKMARK_TIMEOUT)
            .build()
            .map_err(|e| LumaError::SignalError(format!("http client: {}", e)))?;

        let endpoint = match bookmark_endpoint(ws_url) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, "bookmark endpoint unavailable");
                None
            }
        };

        Ok(Self {
            client,
            endpoint,
            session_id,
        })
    }

    /// Spawn a best-effort POST; errors are logged, never surfaced
    pub fn fire(&self) {
        let endpoint = match &self.endpoint {
            Some(url) => url.clone(),
            None => {
                warn!("no bookmark endpoint, skipping highlight signal");
                return;
            }
        };
        let client = self.client.clone();
        let body = BookmarkBody {
            kind: "bookmark",
            session_id: self.session_id.clone(),
        };

        tokio::spawn(async move {
            match client.post(endpoint).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!("highlight signal delivered");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "highlight signal rejected");
                }
                Err(e) => {
                    warn!(error = %e, "highlight signal failed");
                }
            }
        });
    }
}

/// Load the bookmark notification sound as mono f32 samples
pub fn load_notification_wav(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| LumaError::IOError(format!("{:?}: {}", path, e)))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| LumaError::CodecError(format!("wav read: {}", e)))?,
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| LumaError::CodecError(format!("wav read: {}", e)))?
        }
    };

    if channels <= 1 {
        return Ok(samples);
    }
    // Mix down to mono
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_endpoint_ws_to_http() {
        let url = Url::parse("ws://example.com:8080/ws").unwrap();
        let endpoint = bookmark_endpoint(&url).unwrap();
        assert_eq!(endpoint.as_str(), "http://example.com:8080/api/bookmark");
    }

    #[test]
    fn test_bookmark_endpoint_wss_to_https() {
        let url = Url::parse("wss://example.com/ws?token=abc").unwrap();
        let endpoint = bookmark_endpoint(&url).unwrap();
        assert_eq!(endpoint.as_str(), "https://example.com/api/bookmark");
    }

    #[test]
    fn test_bookmark_body_with_session() {
        let body = BookmarkBody {
            kind: "bookmark",
            session_id: Some("abc".to_string()),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"type":"bookmark","session_id":"abc"}"#);
    }

    #[test]
    fn test_bookmark_body_without_session() {
        let body = BookmarkBody {
            kind: "bookmark",
            session_id: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"type":"bookmark"}"#);
    }

    #[test]
    fn test_load_notification_wav_roundtrip() {
        let path = std::env::temp_dir().join("lumalink_chime_test.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..240 {
            let sample = ((i as f32 * 0.1).sin() * 8000.0) as i16;
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let samples = load_notification_wav(&path).unwrap();
        assert_eq!(samples.len(), 240);
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
        std::fs::remove_file(&path).ok();
    }
}

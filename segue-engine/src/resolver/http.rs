//! Generic REST stream provider
//!
//! Wraps one configured platform endpoint. The wire shape is the
//! engine's own; the platform side of each endpoint is an opaque
//! aggregation service:
//!
//! - `GET {base}/alternate/{source_id}` -> `{ stream_url?, artwork_url? }`
//! - `GET {base}/search?q={query}` -> `{ tracks: [{ id, title, artist,
//!   duration, stream_url?, artwork_url? }] }`

use super::{ResolvedStream, StreamProvider};
use crate::error::{Error, Result};
use segue_common::model::{Platform, Track};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// A configured platform endpoint.
pub struct RestProvider {
    name: String,
    base_url: String,
    platform: Platform,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct AlternateResponse {
    stream_url: Option<String>,
    artwork_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Vec<ProviderTrack>,
}

#[derive(Debug, Deserialize)]
struct ProviderTrack {
    id: String,
    title: String,
    artist: String,
    /// Seconds or milliseconds; normalized at conversion.
    duration: f64,
    stream_url: Option<String>,
    artwork_url: Option<String>,
}

impl RestProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, platform: Platform) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        let base_url = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            platform,
            client,
        }
    }

    fn to_track(&self, raw: ProviderTrack) -> Track {
        let mut track = Track::new(raw.id, raw.title, raw.artist, raw.duration, self.platform);
        if let Some(url) = raw.stream_url {
            track = track.with_stream_url(url);
        }
        if let Some(url) = raw.artwork_url {
            track = track.with_artwork_url(url);
        }
        track
    }
}

#[async_trait::async_trait]
impl StreamProvider for RestProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_alternate(&self, track: &Track) -> Result<Option<ResolvedStream>> {
        let url = format!("{}/alternate/{}", self.base_url, track.id.source_id());
        debug!("alternate lookup: {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: AlternateResponse = response
            .error_for_status()
            .map_err(|e| Error::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(body.stream_url.map(|stream_url| ResolvedStream {
            stream_url,
            artwork_url: body.artwork_url,
        }))
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>> {
        let url = format!("{}/search", self.base_url);
        debug!("search on {}: {query}", self.name);
        let body: SearchResponse = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Http(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(body.tracks.into_iter().map(|t| self.to_track(t)).collect())
    }
}

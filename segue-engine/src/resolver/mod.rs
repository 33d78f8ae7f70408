//! Stream URL validation and fallback resolution
//!
//! A track's own stream URL is validated before use; when it is missing,
//! malformed, expired, or carries upstream HTML-entity encoding bugs, the
//! resolver walks an ordered fallback chain: entity-decode repair, then
//! alternate-stream lookup keyed by the track's source id, then a generic
//! title/artist search across the configured platforms. First success
//! wins. A resolution may substitute the stream URL and artwork URL but
//! never the title or artist.

pub mod http;

use crate::error::{Error, Result};
use segue_common::model::Track;
use std::sync::Arc;
use tracing::debug;

/// Successful resolution outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub stream_url: String,
    /// Replacement artwork offered by the fallback source, if any.
    pub artwork_url: Option<String>,
}

/// A platform adapter able to offer alternate streams and search results.
///
/// Implementations wrap platform-specific APIs; the engine treats them as
/// opaque collaborators.
#[async_trait::async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Alternate stream lookup keyed by the track's platform-local id.
    async fn lookup_alternate(&self, track: &Track) -> Result<Option<ResolvedStream>>;

    /// Generic title/artist search.
    async fn search(&self, query: &str) -> Result<Vec<Track>>;
}

/// Validates stream URLs and resolves replacements through the fallback
/// chain.
pub struct StreamResolver {
    providers: Vec<Arc<dyn StreamProvider>>,
}

impl StreamResolver {
    pub fn new(providers: Vec<Arc<dyn StreamProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Resolve a playable URL for `track`.
    ///
    /// Exhausting every option reports `ResolutionExhausted`; the caller
    /// must not retry more than once per load.
    pub async fn resolve(&self, track: &Track) -> Result<ResolvedStream> {
        if let Some(raw) = &track.stream_url {
            match validate_stream_url(raw) {
                Ok(url) => {
                    return Ok(ResolvedStream {
                        stream_url: url,
                        artwork_url: None,
                    })
                }
                Err(e) => debug!("primary stream URL rejected for {}: {e}", track.id),
            }

            // Entity-decode repair: upstream encoding bugs are common
            // enough to be worth one local fix before going to the
            // network.
            let decoded = decode_html_entities(raw);
            if decoded != *raw {
                if let Ok(url) = validate_stream_url(&decoded) {
                    debug!("stream URL for {} repaired by entity decode", track.id);
                    return Ok(ResolvedStream {
                        stream_url: url,
                        artwork_url: None,
                    });
                }
            }
        }

        // (1) Alternate stream lookup keyed by source id.
        for provider in &self.providers {
            match provider.lookup_alternate(track).await {
                Ok(Some(candidate)) => match validate_stream_url(&candidate.stream_url) {
                    Ok(url) => {
                        debug!(
                            "alternate stream for {} via provider {}",
                            track.id,
                            provider.name()
                        );
                        return Ok(ResolvedStream {
                            stream_url: url,
                            artwork_url: candidate.artwork_url,
                        });
                    }
                    Err(e) => debug!(
                        "alternate stream from {} rejected: {e}",
                        provider.name()
                    ),
                },
                Ok(None) => {}
                Err(e) => debug!("alternate lookup failed on {}: {e}", provider.name()),
            }
        }

        // (2) Same title/artist lookup across configured platforms.
        let query = format!("{} {}", track.artist, track.title);
        for provider in &self.providers {
            let candidates = match provider.search(&query).await {
                Ok(c) => c,
                Err(e) => {
                    debug!("search failed on {}: {e}", provider.name());
                    continue;
                }
            };
            for candidate in candidates {
                let Some(raw) = &candidate.stream_url else {
                    continue;
                };
                if let Ok(url) = validate_stream_url(raw) {
                    debug!(
                        "replacement stream for {} via search on {}",
                        track.id,
                        provider.name()
                    );
                    return Ok(ResolvedStream {
                        stream_url: url,
                        artwork_url: candidate.artwork_url.clone(),
                    });
                }
            }
        }

        Err(Error::ResolutionExhausted(track.id.to_string()))
    }
}

/// Validate a candidate stream URL.
///
/// Rules: parses as an absolute URL, scheme is http or https, hostname is
/// non-empty and contains a dot, and the text carries no HTML-entity
/// sequences (`&#`, literal `&amp;`); those indicate an upstream
/// encoding bug and fail validation outright.
pub fn validate_stream_url(raw: &str) -> Result<String> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err(Error::InvalidStreamUrl("empty URL".into()));
    }
    if contains_entity_artifacts(candidate) {
        return Err(Error::InvalidStreamUrl(format!(
            "HTML entity sequence in URL: {candidate}"
        )));
    }

    let parsed = url::Url::parse(candidate)
        .map_err(|e| Error::InvalidStreamUrl(format!("{candidate}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidStreamUrl(format!(
                "unsupported scheme '{other}'"
            )))
        }
    }

    match parsed.host_str() {
        Some(host) if host.contains('.') => {}
        Some(host) => {
            return Err(Error::InvalidStreamUrl(format!(
                "hostname '{host}' has no dot"
            )))
        }
        None => return Err(Error::InvalidStreamUrl("missing hostname".into())),
    }

    Ok(candidate.to_string())
}

/// Un-decoded entity markers that disqualify a URL.
fn contains_entity_artifacts(s: &str) -> bool {
    s.contains("&#") || s.contains("&amp;")
}

/// Decode the HTML entity forms seen in upstream stream URLs: `&amp;`,
/// `&#NN;`, and `&#xNN;`. Unknown or malformed entities are left as-is.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'&' {
            if let Some(end) = input[i..].find(';').map(|off| i + off) {
                let entity = &input[i + 1..end];
                let replacement = match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    _ => parse_numeric_entity(entity),
                };
                if let Some(ch) = replacement {
                    out.push(ch);
                    i = end + 1;
                    continue;
                }
            }
        }
        let ch_len = input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        out.push_str(&input[i..i + ch_len]);
        i += ch_len;
    }
    out
}

fn parse_numeric_entity(entity: &str) -> Option<char> {
    let digits = entity.strip_prefix('#')?;
    let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u32>().ok()?
    };
    char::from_u32(code)
}

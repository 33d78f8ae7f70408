//! Queue continuity (autoplay) search
//!
//! When the queue empties with nothing left to replay, the continuity
//! manager derives search queries from the current track and recent
//! listening history, fans them out to the configured providers, and
//! returns replacement candidates. The first two queries run concurrently
//! for latency; further queries run sequentially only while the result
//! set is short. The caller appends the results and owns the
//! stop-after-bounded-retries policy.

use crate::resolver::StreamProvider;
use rand::seq::SliceRandom;
use segue_common::model::{Track, TrackId};
use segue_common::params::{
    CONTINUITY_EXTRA_QUERIES, CONTINUITY_HISTORY_ARTISTS, CONTINUITY_MAX_APPEND,
    CONTINUITY_MIN_DURATION_SECS, CONTINUITY_MIN_RESULTS, CONTINUITY_PARALLEL_QUERIES,
    REMIX_INDICATORS, TITLE_MIN_WORD_LEN, TITLE_STOPLIST,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Inputs to one replenishment round.
pub struct ContinuityContext {
    pub current: Option<Track>,
    /// Recent history, most-recent-first.
    pub recent: Vec<Track>,
    /// Ids that must not be suggested: queued, played, current.
    pub exclude: HashSet<TrackId>,
}

pub struct QueueContinuityManager {
    providers: Vec<Arc<dyn StreamProvider>>,
}

impl QueueContinuityManager {
    pub fn new(providers: Vec<Arc<dyn StreamProvider>>) -> Self {
        Self { providers }
    }

    /// Discover replacement tracks; empty result means the search failed
    /// and playback should stop rather than loop.
    pub async fn replenish(&self, ctx: &ContinuityContext) -> Vec<Track> {
        if self.providers.is_empty() {
            debug!("continuity search skipped: no providers configured");
            return Vec::new();
        }

        let queries = derive_queries(ctx.current.as_ref(), &ctx.recent);
        if queries.is_empty() {
            debug!("continuity search skipped: no queries derivable");
            return Vec::new();
        }

        let mut found: Vec<Track> = Vec::new();
        let mut seen: HashSet<TrackId> = ctx.exclude.clone();

        // First wave: two queries concurrently.
        let mut wave = queries.iter().take(CONTINUITY_PARALLEL_QUERIES);
        match (wave.next(), wave.next()) {
            (Some(first), Some(second)) => {
                let (a, b) = tokio::join!(self.run_query(first), self.run_query(second));
                self.collect(a, &mut found, &mut seen);
                self.collect(b, &mut found, &mut seen);
            }
            (Some(only), None) => {
                let a = self.run_query(only).await;
                self.collect(a, &mut found, &mut seen);
            }
            _ => {}
        }

        // Top-up: sequential extras while the result set is short.
        let mut extras_run = 0;
        for query in queries.iter().skip(CONTINUITY_PARALLEL_QUERIES) {
            if found.len() >= CONTINUITY_MIN_RESULTS || extras_run >= CONTINUITY_EXTRA_QUERIES {
                break;
            }
            let results = self.run_query(query).await;
            self.collect(results, &mut found, &mut seen);
            extras_run += 1;
        }

        debug!(
            "continuity search found {} candidates from {} queries",
            found.len(),
            queries.len().min(CONTINUITY_PARALLEL_QUERIES + extras_run)
        );

        let mut rng = rand::thread_rng();
        found.shuffle(&mut rng);
        found.truncate(CONTINUITY_MAX_APPEND);
        found
    }

    async fn run_query(&self, query: &str) -> Vec<Track> {
        let mut results = Vec::new();
        for provider in &self.providers {
            match provider.search(query).await {
                Ok(tracks) => results.extend(tracks),
                Err(e) => debug!("continuity query '{query}' failed on {}: {e}", provider.name()),
            }
        }
        results
    }

    fn collect(&self, results: Vec<Track>, found: &mut Vec<Track>, seen: &mut HashSet<TrackId>) {
        for track in results {
            if track.duration_secs <= CONTINUITY_MIN_DURATION_SECS {
                continue;
            }
            if seen.contains(&track.id) {
                continue;
            }
            seen.insert(track.id.clone());
            found.push(track);
        }
    }
}

/// Build the ordered query list:
/// 1. current track's artist
/// 2. artist + "remix" when the title carries a remix indicator
/// 3. significant words from the title
/// 4. up to three distinct artists from recent history
pub fn derive_queries(current: Option<&Track>, recent: &[Track]) -> Vec<String> {
    fn push_unique(q: String, queries: &mut Vec<String>) {
        let trimmed = q.trim().to_string();
        if trimmed.is_empty() {
            return;
        }
        if !queries
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&trimmed))
        {
            queries.push(trimmed);
        }
    }

    let mut queries: Vec<String> = Vec::new();

    if let Some(track) = current {
        push_unique(track.artist.clone(), &mut queries);

        let lower_title = track.title.to_lowercase();
        if REMIX_INDICATORS.iter().any(|kw| lower_title.contains(kw)) {
            push_unique(format!("{} remix", track.artist), &mut queries);
        }

        let significant = significant_title_words(&track.title);
        if !significant.is_empty() {
            push_unique(significant.join(" "), &mut queries);
        }
    }

    let current_artist = current.map(|t| t.artist.to_lowercase());
    let mut history_artists = 0;
    for track in recent {
        if history_artists >= CONTINUITY_HISTORY_ARTISTS {
            break;
        }
        let lower = track.artist.to_lowercase();
        if Some(&lower) == current_artist.as_ref() {
            continue;
        }
        let before = queries.len();
        push_unique(track.artist.clone(), &mut queries);
        if queries.len() > before {
            history_artists += 1;
        }
    }

    queries
}

/// Title words usable as a search query: longer than the minimum, not on
/// the stoplist, stripped of punctuation.
fn significant_title_words(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > TITLE_MIN_WORD_LEN)
        .filter(|w| !TITLE_STOPLIST.contains(&w.as_str()))
        .collect()
}

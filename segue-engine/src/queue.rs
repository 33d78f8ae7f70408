//! Play queue and history
//!
//! `upcoming` is a FIFO of tracks still to play (head = next). `history`
//! is a bounded ring, most-recent-first. A track removed from `upcoming`
//! for playback is pushed to the front of `history`; the ring never
//! exceeds its capacity, the oldest entry is dropped.

use rand::seq::SliceRandom;
use segue_common::model::{Track, TrackId};
use segue_common::params::HISTORY_CAPACITY;
use std::collections::{HashSet, VecDeque};

pub struct PlayQueue {
    upcoming: Vec<Track>,
    history: VecDeque<Track>,
    history_capacity: usize,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::with_history_capacity(HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            upcoming: Vec::new(),
            history: VecDeque::new(),
            history_capacity,
        }
    }

    /// Pop the next track to play, recording `finished` (the track being
    /// replaced, if any) at the front of history.
    pub fn advance(&mut self, finished: Option<Track>) -> Option<Track> {
        if let Some(track) = finished {
            self.push_history(track);
        }
        if self.upcoming.is_empty() {
            None
        } else {
            Some(self.upcoming.remove(0))
        }
    }

    /// Push a finished/skipped track to the front of history, dropping
    /// the oldest entry beyond capacity.
    pub fn push_history(&mut self, track: Track) {
        self.history.push_front(track);
        while self.history.len() > self.history_capacity {
            self.history.pop_back();
        }
    }

    /// Take the most recent history entry (for `previous`).
    pub fn pop_history(&mut self) -> Option<Track> {
        self.history.pop_front()
    }

    /// Append a track to the end of `upcoming`.
    pub fn enqueue(&mut self, track: Track) {
        self.upcoming.push(track);
    }

    /// Append several tracks to the end of `upcoming`.
    pub fn enqueue_all(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.upcoming.extend(tracks);
    }

    /// Put a track back at the head of `upcoming` (for `previous`).
    pub fn push_front(&mut self, track: Track) {
        self.upcoming.insert(0, track);
    }

    pub fn peek_next(&self) -> Option<&Track> {
        self.upcoming.first()
    }

    pub fn upcoming(&self) -> &[Track] {
        &self.upcoming
    }

    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter()
    }

    pub fn upcoming_ids(&self) -> Vec<TrackId> {
        self.upcoming.iter().map(|t| t.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.upcoming.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upcoming.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_upcoming(&mut self) {
        self.upcoming.clear();
    }

    /// Reorder the live queue in place (Fisher-Yates); affects already
    /// queued tracks, not just future adds.
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.upcoming.shuffle(&mut rng);
    }

    /// Move the whole history back into `upcoming` in original play order
    /// (repeat-all replay). History is most-recent-first, so replay
    /// reverses it.
    pub fn replay_history(&mut self) -> usize {
        let mut replay: Vec<Track> = self.history.drain(..).collect();
        replay.reverse();
        let count = replay.len();
        self.upcoming.extend(replay);
        count
    }

    /// Ids the continuity search must not suggest again: queued, played,
    /// and (supplied by the caller) the current track.
    pub fn known_ids(&self) -> HashSet<TrackId> {
        self.upcoming
            .iter()
            .chain(self.history.iter())
            .map(|t| t.id.clone())
            .collect()
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

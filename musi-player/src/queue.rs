//! Queue store
//!
//! Ordered pending tracks for one session. Insertion order is playback
//! order except for explicit front-inserts. Duplicates are allowed.
//!
//! All operations are synchronous and in-memory; the controller shares the
//! store behind a lock so the ingestion pipeline can append while playback
//! advances.

use musi_common::db::Track;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::VecDeque;

/// One page of the queue as shown by the `queue` command
#[derive(Debug, Clone, Serialize)]
pub struct QueuePage {
    /// 1-based page number actually shown (clamped to the last page)
    pub page: usize,
    pub total_pages: usize,
    /// (1-based queue position, track)
    pub entries: Vec<(usize, Track)>,
    pub total_tracks: usize,
    pub total_duration_secs: u64,
}

#[derive(Debug, Default, Clone)]
pub struct QueueStore {
    tracks: VecDeque<Track>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the end
    pub fn enqueue(&mut self, track: Track) {
        self.tracks.push_back(track);
    }

    /// Insert at index 0 so the track plays next
    pub fn enqueue_front(&mut self, track: Track) {
        self.tracks.push_front(track);
    }

    /// Append in order; returns the number added
    pub fn enqueue_many<I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = Track>,
    {
        let before = self.tracks.len();
        self.tracks.extend(tracks);
        self.tracks.len() - before
    }

    /// Remove and return index 0, or None when empty
    pub fn dequeue_head(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    /// Remove the first structurally equal entry
    ///
    /// Returns true if an entry was found and removed.
    pub fn remove(&mut self, track: &Track) -> bool {
        match self.tracks.iter().position(|t| t == track) {
            Some(index) => {
                self.tracks.remove(index);
                true
            }
            None => false,
        }
    }

    /// Relocate the entry at `index` (0-based) to the front
    ///
    /// Out-of-bounds indices leave the queue untouched and return false.
    pub fn move_to_front(&mut self, index: usize) -> bool {
        match self.tracks.remove(index) {
            Some(track) => {
                self.tracks.push_front(track);
                true
            }
            None => false,
        }
    }

    /// Uniform random permutation in place
    pub fn shuffle(&mut self) {
        self.tracks
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
    }

    /// Sum of known durations in seconds (unknown counts as 0)
    pub fn total_duration(&self) -> u64 {
        self.tracks.iter().map(|t| t.duration_secs).sum()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    /// 1-based page of `page_size` entries; pages past the end show the last page
    pub fn page(&self, page: usize, page_size: usize) -> QueuePage {
        let page_size = page_size.max(1);
        let total_pages = self.tracks.len().div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);
        let start = (page - 1) * page_size;

        let entries = self
            .tracks
            .iter()
            .enumerate()
            .skip(start)
            .take(page_size)
            .map(|(i, t)| (i + 1, t.clone()))
            .collect();

        QueuePage {
            page,
            total_pages,
            entries,
            total_tracks: self.tracks.len(),
            total_duration_secs: self.total_duration(),
        }
    }
}

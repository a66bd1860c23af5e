//! Ready queue and bounded playback history backing the slideshow.

use std::collections::VecDeque;
use std::path::PathBuf;

use rand::Rng;

use crate::events::ImageHandle;

/// Loaded images waiting to be shown, in completion order.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    items: VecDeque<ImageHandle>,
}

impl ReadyQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, image: ImageHandle) {
        self.items.push_back(image);
    }

    /// Take the oldest ready image.
    pub fn pop(&mut self) -> Option<ImageHandle> {
        self.items.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the queue has reached the soft cap `limit`.
    #[must_use]
    pub fn is_saturated(&self, limit: usize) -> bool {
        self.items.len() >= limit
    }
}

/// One displayed frame and the identifier it was loaded from.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub image: ImageHandle,
    pub path: PathBuf,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(image: ImageHandle) -> Self {
        let path = image.path.clone();
        Self { image, path }
    }
}

/// Displayed images, oldest first. The last entry is the current frame.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
    }

    /// Drop entries from the front until at most `max` remain.
    ///
    /// Returns how many entries were evicted.
    pub fn trim(&mut self, max: usize) -> usize {
        let excess = self.entries.len().saturating_sub(max);
        self.entries.drain(..excess);
        excess
    }

    /// Uniformly pick a previously shown entry.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<HistoryEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = rng.random_range(0..self.entries.len());
        self.entries.get(idx).cloned()
    }

    /// The newest `n` entries, newest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev().take(n)
    }

    /// Resolve a browse cursor (`offset < 0`) against the current length.
    ///
    /// Offsets past the oldest entry wrap around to the newest end again, so
    /// `-len - 1` lands on the newest entry. Returns `None` for an empty
    /// history or a non-negative offset.
    #[must_use]
    pub fn resolve_offset(&self, offset: i64) -> Option<&HistoryEntry> {
        let idx = browse_index(self.entries.len(), offset)?;
        self.entries.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index into a history of length `len` for a negative browse offset.
///
/// Equivalent to repeatedly adding `len` while `offset < -len` and then taking
/// `len + offset`.
#[must_use]
pub fn browse_index(len: usize, offset: i64) -> Option<usize> {
    if len == 0 || offset >= 0 {
        return None;
    }
    let len = i64::try_from(len).ok()?;
    usize::try_from(offset.rem_euclid(len)).ok()
}

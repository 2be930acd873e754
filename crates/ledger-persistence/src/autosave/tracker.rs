//! Dirty state tracking for auto-save.

use std::time::Instant;

/// Tracks unsaved changes in a ledger.
///
/// Lives inside the same lock as the value it describes, so checking the
/// flag and writing the snapshot happen as one step.
#[derive(Debug, Clone, Default)]
pub struct DirtyTracker {
    /// Whether there are unsaved changes.
    dirty: bool,

    /// Whether a save request is queued and not yet claimed by the worker.
    pending: bool,

    /// When the most recent change was made.
    last_change: Option<Instant>,

    /// When the first unsaved change was made.
    /// Reset when saved.
    first_unsaved_change: Option<Instant>,
}

impl DirtyTracker {
    /// Create a new tracker with no unsaved changes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are unsaved changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Check if a queued save request is still outstanding.
    #[inline]
    pub fn has_pending_request(&self) -> bool {
        self.pending
    }

    /// Mark the ledger as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        let now = Instant::now();
        self.dirty = true;
        self.last_change = Some(now);

        // Only set first_unsaved_change if this is the first change since last save
        if self.first_unsaved_change.is_none() {
            self.first_unsaved_change = Some(now);
        }
    }

    /// Note that a save request is about to be queued.
    ///
    /// Returns false if one is already outstanding, in which case the caller
    /// should not queue another.
    pub fn request_save(&mut self) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// Claim the outstanding request. Returns true if there is anything to
    /// write; the caller then saves and calls [`clear`](Self::clear).
    pub fn try_claim_dirty(&mut self) -> bool {
        self.pending = false;
        self.dirty
    }

    /// Mark that a save has completed successfully.
    pub fn clear(&mut self) {
        self.dirty = false;
        self.first_unsaved_change = None;
    }

    /// Get milliseconds since the last change.
    pub fn ms_since_last_change(&self) -> Option<u64> {
        self.last_change.map(|t| t.elapsed().as_millis() as u64)
    }

    /// Get milliseconds since the first unsaved change.
    pub fn ms_since_first_unsaved(&self) -> Option<u64> {
        self.first_unsaved_change
            .map(|t| t.elapsed().as_millis() as u64)
    }
}

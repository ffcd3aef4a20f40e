//! Core model in Raft: the replicated log.
//!
//! Lives inside the peer's guarded state; every read and write happens while
//! the state lock is held, so it carries no interior synchronization.

use tracing::debug;
use tracing::trace;

use crate::proto::Entry;
use crate::Result;
use crate::StorageError;

/// Ordered log indexed from 1. Position 0 always holds the sentinel entry, so
/// `entries[i].index == i` for every slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaftLog {
    entries: Vec<Entry>,
}

impl Default for RaftLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RaftLog {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry::sentinel()],
        }
    }

    /// Rebuilds a log from persisted entries (sentinel excluded).
    ///
    /// Rejects gaps, out-of-order indices and decreasing terms: a log that
    /// violates these could never have been written by this peer.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        let mut log = Self::new();
        for entry in entries {
            let expected = log.last_entry_id() + 1;
            if entry.index != expected {
                return Err(StorageError::DataCorruption(format!(
                    "log entry index {} found where {} was expected",
                    entry.index, expected
                ))
                .into());
            }
            if entry.term == 0 || entry.term < log.last_entry_term() {
                return Err(StorageError::DataCorruption(format!(
                    "log entry {} has term {} after term {}",
                    entry.index,
                    entry.term,
                    log.last_entry_term()
                ))
                .into());
            }
            log.entries.push(entry);
        }
        Ok(log)
    }

    pub fn entry(
        &self,
        index: u64,
    ) -> Option<&Entry> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize)
    }

    /// Term stored at `index`. The sentinel answers 0 for index 0.
    pub fn entry_term(
        &self,
        index: u64,
    ) -> Option<u64> {
        self.entries.get(index as usize).map(|e| e.term)
    }

    pub fn last_entry_id(&self) -> u64 {
        (self.entries.len() - 1) as u64
    }

    pub fn last_entry_term(&self) -> u64 {
        self.entries.last().map(|e| e.term).unwrap_or(0)
    }

    /// (last_log_index, last_log_term)
    pub fn get_last_entry_metadata(&self) -> (u64, u64) {
        (self.last_entry_id(), self.last_entry_term())
    }

    /// Entries without the sentinel.
    pub fn entries(&self) -> &[Entry] {
        &self.entries[1..]
    }

    pub fn len(&self) -> usize {
        self.entries.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `max` entries starting at `start` (inclusive).
    pub fn get_entries_from(
        &self,
        start: u64,
        max: u64,
    ) -> Vec<Entry> {
        let start = start.max(1);
        if start > self.last_entry_id() {
            return Vec::new();
        }
        let from = start as usize;
        let to = (start.saturating_add(max) as usize).min(self.entries.len());
        self.entries[from..to].to_vec()
    }

    /// Appends a new command at the end of the log and returns its index.
    pub fn append_command(
        &mut self,
        term: u64,
        command: Vec<u8>,
    ) -> u64 {
        let index = self.last_entry_id() + 1;
        self.entries.push(Entry { index, term, command });
        trace!(index, term, "append_command");
        index
    }

    /// Lowest index holding an entry of `term`.
    ///
    /// Terms never decrease along the log, so a partition point finds the
    /// start of the run.
    pub fn first_index_for_term(
        &self,
        term: u64,
    ) -> Option<u64> {
        if term == 0 {
            return None;
        }
        let pos = self.entries.partition_point(|e| e.term < term);
        match self.entries.get(pos) {
            Some(e) if e.term == term => Some(e.index),
            _ => None,
        }
    }

    /// Merges `new_entries` (which start at `prev_log_index + 1`) into the log.
    ///
    /// Entries already present with the same term are skipped. At the first
    /// index whose term differs, the existing suffix is truncated and the rest
    /// of `new_entries` appended. Returns whether the log changed.
    ///
    /// The caller must have verified the entry at `prev_log_index` matches.
    pub fn filter_out_conflicts_and_append(
        &mut self,
        prev_log_index: u64,
        new_entries: Vec<Entry>,
    ) -> bool {
        let mut mutated = false;
        for (offset, entry) in new_entries.into_iter().enumerate() {
            let index = prev_log_index + 1 + offset as u64;
            match self.entry_term(index) {
                Some(term) if term == entry.term => continue,
                Some(term) => {
                    debug!(
                        index,
                        existing_term = term,
                        new_term = entry.term,
                        "log conflict, truncating suffix"
                    );
                    self.entries.truncate(index as usize);
                }
                None => {}
            }
            self.entries.push(Entry {
                index,
                term: entry.term,
                command: entry.command,
            });
            mutated = true;
        }
        mutated
    }

    /// Highest index replicated on a majority whose entry carries
    /// `current_term`, if it is above `commit_index`.
    ///
    /// `peer_matched_ids` holds every follower's match index; the leader's own
    /// last index is added here. Older-term entries are never counted directly;
    /// they commit once a current-term entry above them does.
    pub fn calculate_majority_matched_index(
        &self,
        current_term: u64,
        commit_index: u64,
        mut peer_matched_ids: Vec<u64>,
    ) -> Option<u64> {
        // Include leader's last index
        peer_matched_ids.push(self.last_entry_id());

        // Sort in descending order
        peer_matched_ids.sort_unstable_by(|a, b| b.cmp(a));

        // The (n/2)-th highest index is held by a majority
        let majority_index = peer_matched_ids[peer_matched_ids.len() / 2];

        debug!(
            "Majority calculation: matched={:?}, majority_index={}",
            peer_matched_ids, majority_index,
        );

        if majority_index <= commit_index {
            return None;
        }

        match self.entry_term(majority_index) {
            Some(term) if term == current_term => Some(majority_index),
            _ => None,
        }
    }
}

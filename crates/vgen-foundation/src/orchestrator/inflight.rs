//! Tracking of generations that have not yet returned to their caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct InFlight {
    /// Distinguishes a re-registration under the same job id
    seq: u64,
    started: Instant,
    cancel: CancellationToken,
}

/// Handle returned by [`InFlightRegistry::register`]; completing it removes
/// exactly the entry it was issued for.
#[derive(Debug)]
pub(crate) struct InFlightTicket {
    pub(crate) job_id: String,
    seq: u64,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub(crate) struct InFlightRegistry {
    entries: DashMap<String, InFlight>,
    next_seq: AtomicU64,
}

impl InFlightRegistry {
    /// The returned token is a child of `parent` when one is given, so
    /// cancelling either the job or the caller's token stops the work.
    pub(crate) fn register(
        &self,
        job_id: &str,
        parent: Option<&CancellationToken>,
    ) -> InFlightTicket {
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            job_id.to_string(),
            InFlight {
                seq,
                started: Instant::now(),
                cancel: cancel.clone(),
            },
        );
        InFlightTicket {
            job_id: job_id.to_string(),
            seq,
            cancel,
        }
    }

    /// Like [`register`](Self::register), but leaves an entry already held
    /// under `job_id` alone and returns `None`.
    pub(crate) fn try_register(
        &self,
        job_id: &str,
        parent: Option<&CancellationToken>,
    ) -> Option<InFlightTicket> {
        match self.entries.entry(job_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let cancel =
                    parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(InFlight {
                    seq,
                    started: Instant::now(),
                    cancel: cancel.clone(),
                });
                Some(InFlightTicket {
                    job_id: job_id.to_string(),
                    seq,
                    cancel,
                })
            }
        }
    }

    /// Delete-if-still-ours; a concurrent sweep may already have removed it.
    pub(crate) fn complete(&self, ticket: &InFlightTicket) -> bool {
        self.entries
            .remove_if(&ticket.job_id, |_, entry| entry.seq == ticket.seq)
            .is_some()
    }

    /// Cancel a running job. Returns `false` if it is not in flight.
    pub(crate) fn cancel(&self, job_id: &str) -> bool {
        match self.entries.get(job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&self) {
        for entry in self.entries.iter() {
            entry.cancel.cancel();
        }
    }

    pub(crate) fn contains(&self, job_id: &str) -> bool {
        self.entries.contains_key(job_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Remove and cancel entries older than `stale_after`. Each removal
    /// re-checks the entry under the shard lock, so an entry completed or
    /// replaced in the meantime is left alone.
    pub(crate) fn sweep_stale(&self, stale_after: Duration) -> Vec<String> {
        let now = Instant::now();
        let candidates: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.started) >= stale_after)
            .map(|e| (e.key().clone(), e.seq))
            .collect();

        candidates
            .into_iter()
            .filter_map(|(job_id, seq)| {
                self.entries
                    .remove_if(&job_id, |_, entry| entry.seq == seq)
                    .map(|(job_id, entry)| {
                        entry.cancel.cancel();
                        job_id
                    })
            })
            .collect()
    }
}

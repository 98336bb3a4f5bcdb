//! Bookkeeping for requests awaiting acknowledgment.

use core::cmp::Reverse;
use rdscom_proto::Message;
use rustc_hash::FxBuildHasher;

use super::FailureCallback;

/// Hash map keyed by sequence number.
type SeqMap<V> = rustc_hash::FxHashMap<u16, V>;

/// Priority queue keyed by sequence number, with associated priority value.
type SeqPQ<V> = priority_queue::PriorityQueue<u16, V, FxBuildHasher>;

/// A request that was sent, and hasn't been acknowledged yet.
pub(crate) struct SentMessage {
    pub(crate) message: Message,
    pub(crate) time_sent_ms: u64,
    pub(crate) retries: u8,
    pub(crate) on_failure: Option<FailureCallback>,
}

impl core::fmt::Debug for SentMessage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SentMessage")
            .field("sequence_number", &self.message.sequence_number())
            .field("time_sent_ms", &self.time_sent_ms)
            .field("retries", &self.retries)
            .field("has_failure_callback", &self.on_failure.is_some())
            .finish()
    }
}

/// What to do with an entry whose deadline has passed.
pub(crate) enum Expiry {
    /// Send these bytes again. The entry's retry count was already bumped.
    Retry {
        bytes: Vec<u8>,
        /// Time since the previous transmission.
        waited_ms: u64,
        /// Retry count, including this one.
        attempt: u8,
    },
    /// The entry ran out of retries.
    Exhausted,
}

/// Table of unacknowledged requests, keyed by sequence number.
///
/// Alongside the table, a priority queue of retry deadlines lets expired entries be
/// found without scanning every entry.
pub(crate) struct PendingAcks {
    entries: SeqMap<SentMessage>,
    /// We use [`core::cmp::Reverse`] here to ensure the _earliest_ deadline
    /// has the _highest_ priority
    deadlines: SeqPQ<Reverse<u64>>,
}

impl core::fmt::Debug for PendingAcks {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // `FxBuildHasher` doesn't implement `Debug`, so format the queue's contents.
        f.debug_struct("PendingAcks")
            .field("entries", &self.entries)
            .field("deadlines", &self.deadlines.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PendingAcks {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

impl PendingAcks {
    #[inline(always)]
    pub(crate) const fn new() -> Self {
        Self {
            entries: SeqMap::with_hasher(FxBuildHasher),
            deadlines: SeqPQ::with_hasher(FxBuildHasher),
        }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub(crate) fn contains(&self, seq: u16) -> bool {
        self.entries.contains_key(&seq)
    }

    /// Records `message` as sent at `now_ms`, replacing any previous entry with the same
    /// sequence number.
    ///
    /// Returns `true` if no entry existed for this sequence number.
    pub(crate) fn insert(
        &mut self,
        message: Message,
        now_ms: u64,
        timeout_ms: u64,
        on_failure: Option<FailureCallback>,
    ) -> bool {
        let seq = message.sequence_number();

        self.deadlines
            .push(seq, Reverse(now_ms.saturating_add(timeout_ms)));

        self.entries
            .insert(
                seq,
                SentMessage {
                    message,
                    time_sent_ms: now_ms,
                    retries: 0,
                    on_failure,
                },
            )
            .is_none()
    }

    /// Removes and returns the entry for `seq`, if any.
    #[inline]
    pub(crate) fn acknowledge(&mut self, seq: u16) -> Option<SentMessage> {
        self.deadlines.remove(&seq);
        self.entries.remove(&seq)
    }

    /// Pops every sequence number whose deadline is strictly before `now_ms`.
    ///
    /// A popped sequence number no longer has a deadline: it must be handed to
    /// [`Self::expire`] to either be rescheduled or removed.
    pub(crate) fn take_expired(&mut self, now_ms: u64) -> Vec<u16> {
        let mut expired = Vec::new();

        while let Some((seq, _)) = self
            .deadlines
            .pop_if(|_, Reverse(deadline)| *deadline < now_ms)
        {
            expired.push(seq);
        }

        expired
    }

    /// Handles an expired entry: either schedule a retry, or report it as exhausted.
    ///
    /// Exhausted entries stay in the table until [`Self::acknowledge`] removes them.
    pub(crate) fn expire(
        &mut self,
        seq: u16,
        now_ms: u64,
        timeout_ms: u64,
        max_retries: u8,
    ) -> Option<Expiry> {
        let entry = self.entries.get_mut(&seq)?;

        if entry.retries >= max_retries {
            return Some(Expiry::Exhausted);
        }

        let waited_ms = now_ms.saturating_sub(entry.time_sent_ms);

        entry.retries = entry.retries.strict_add(1);
        entry.time_sent_ms = now_ms;
        self.deadlines
            .push(seq, Reverse(now_ms.saturating_add(timeout_ms)));

        Some(Expiry::Retry {
            bytes: entry.message.serialize(),
            waited_ms,
            attempt: entry.retries,
        })
    }

    /// Returns the entry for `seq` without removing it.
    #[inline(always)]
    pub(crate) fn get(&self, seq: u16) -> Option<&SentMessage> {
        self.entries.get(&seq)
    }
}

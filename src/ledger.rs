//! Book keeping of queries and their results.
//!
//! The ledger is the state of the query coordinator: which queries are out,
//! which have been answered, what the answers were, and which errors have
//! been seen. It knows nothing about transports or callbacks beyond
//! holding on to the latter. Every change happens through one of a few
//! methods, each of which leaves the ledger consistent.

use crate::query::{Callback, Delivery, QueryKey};
use crate::status::QueryError;
use crate::transport::Finished;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

//------------ Ledger --------------------------------------------------------

/// The state of the query coordinator.
#[derive(Default)]
pub(crate) struct Ledger {
    /// The queries currently out with the transport.
    pending: HashMap<QueryKey, Pending>,

    /// The queries that have been answered at least once.
    completed: HashSet<QueryKey>,

    /// The merged records per name.
    results: BTreeMap<String, BTreeSet<String>>,

    /// The distinct errors seen so far.
    errors: BTreeSet<QueryError>,

    /// The ticket for the next submission.
    next_ticket: u64,
}

/// A query that is out with the transport.
struct Pending {
    /// The ticket of the submission.
    ticket: u64,

    /// When the query was submitted.
    since: Instant,

    /// Everyone waiting for the outcome.
    callbacks: Vec<Callback>,
}

impl Pending {
    /// Returns how long the query has been pending at `now`.
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.since)
    }
}

/// What to do with a new submission.
pub(crate) enum Admission {
    /// The query has been answered before.
    ///
    /// Contains everything known about the name.
    Replay(Vec<String>),

    /// The query is out already.
    Pending,

    /// The query needs to go to the transport under the given ticket.
    Submit(u64),
}

impl Ledger {
    /// Decides what to do about a query.
    ///
    /// If this returns [`Admission::Submit`], the query is not yet
    /// pending. The caller has to hand it to the transport and then call
    /// [`Ledger::submitted`] if that succeeded.
    pub fn admit(&mut self, key: &QueryKey) -> Admission {
        if self.completed.contains(key) {
            debug!("{key}: answered before, replaying");
            return Admission::Replay(
                self.results
                    .get(key.name())
                    .map(|records| records.iter().cloned().collect())
                    .unwrap_or_default(),
            );
        }
        if self.pending.contains_key(key) {
            debug!("{key}: already pending");
            return Admission::Pending;
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        Admission::Submit(ticket)
    }

    /// Adds a callback to a pending query.
    pub fn join(&mut self, key: &QueryKey, callback: Option<Callback>) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.callbacks.extend(callback)
        }
    }

    /// Marks a query as handed to the transport.
    pub fn submitted(
        &mut self,
        key: QueryKey,
        ticket: u64,
        callback: Option<Callback>,
    ) {
        self.pending.insert(
            key,
            Pending {
                ticket,
                since: Instant::now(),
                callbacks: callback.into_iter().collect(),
            },
        );
    }

    /// Records the outcome of a query.
    ///
    /// Returns `None` if the outcome does not belong to the current
    /// submission of its query. This happens if the query has been
    /// expired in the meantime.
    pub fn finish(&mut self, finished: Finished) -> Option<Delivery> {
        let Finished {
            key,
            ticket,
            outcome,
        } = finished;
        match self.pending.get(&key) {
            Some(pending) if pending.ticket == ticket => {}
            _ => {
                debug!(
                    "{key}: dropping stale outcome of submission {ticket}"
                );
                return None;
            }
        }
        let pending = self.pending.remove(&key)?;
        match &outcome {
            Ok(records) if !records.is_empty() => {
                self.results
                    .entry(key.name().into())
                    .or_default()
                    .extend(records.iter().cloned());
                debug!("{key}: {} records", records.len());
                self.completed.insert(key.clone());
            }
            Ok(_) => {
                debug!("{key}: empty answer");
            }
            Err(err) => {
                debug!("{key}: failed with {err}");
                self.errors.insert(*err);
            }
        }
        Some(Delivery::new(key.name().into(), outcome, pending.callbacks))
    }

    /// Fails all queries that have been pending for longer than `deadline`.
    pub fn expire(
        &mut self,
        now: Instant,
        deadline: Duration,
    ) -> Vec<Delivery> {
        let overdue: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.age(now) >= deadline)
            .map(|(key, _)| key.clone())
            .collect();
        let mut res = Vec::with_capacity(overdue.len());
        for key in overdue {
            if let Some(pending) = self.pending.remove(&key) {
                debug!("{key}: deadline passed");
                self.errors.insert(QueryError::TIMEOUT);
                res.push(Delivery::new(
                    key.name().into(),
                    Err(QueryError::TIMEOUT),
                    pending.callbacks,
                ));
            }
        }
        res
    }

    /// Returns the time until the next pending query runs out.
    pub fn next_expiry(
        &self,
        now: Instant,
        deadline: Duration,
    ) -> Option<Duration> {
        self.pending
            .values()
            .map(|pending| deadline.saturating_sub(pending.age(now)))
            .min()
    }

    /// Returns the number of pending queries.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Returns whether the query is pending.
    pub fn is_pending(&self, key: &QueryKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Returns whether the query has been answered before.
    pub fn is_completed(&self, key: &QueryKey) -> bool {
        self.completed.contains(key)
    }

    /// Returns the merged results, optionally clearing them.
    ///
    /// Clearing the results also forgets which queries have been
    /// answered, so that submitting them again asks the transport anew
    /// rather than replaying nothing.
    pub fn results(&mut self, clear: bool) -> Vec<(String, Vec<String>)> {
        let res = self
            .results
            .iter()
            .map(|(name, records)| {
                (name.clone(), records.iter().cloned().collect())
            })
            .collect();
        if clear {
            self.results.clear();
            self.completed.clear();
        }
        res
    }

    /// Returns the distinct errors, optionally clearing them.
    pub fn errors(&mut self, clear: bool) -> Vec<QueryError> {
        let res = self.errors.iter().copied().collect();
        if clear {
            self.errors.clear();
        }
        res
    }
}

//============ Tests =========================================================

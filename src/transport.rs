//! The interface to the code actually talking to name servers.
//!
//! The engine does not speak the DNS wire protocol itself. Instead, it
//! hands every query to a [`Transport`] and drives that transport whenever
//! one of its sockets becomes ready or its timers are due. The transport
//! is thus entirely passive: it never blocks and never spawns anything. It
//! only tells the engine which descriptors it is interested in and how
//! long it can wait at most, and it does its work inside
//! [`Transport::drive`].
//!
//! When a query is done, the transport completes the [`Completion`] it was
//! handed for it. Completions are merely queued at that point; the engine
//! picks them up once the transport has returned control.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::iana::Rtype;
use crate::query::QueryKey;
use crate::status::QueryError;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

//------------ Transport -----------------------------------------------------

/// A resolver transport.
///
/// Implementations perform the network exchange for queries, including
/// message encoding, server selection, retries, and timeouts.
pub trait Transport {
    /// Starts a query for `qname` and `rtype`.
    ///
    /// The name is absolute, i.e., ends in a dot. Once the query is done,
    /// successfully or not, the transport must complete `completion`.
    /// It may do so right away.
    ///
    /// An error is returned only if the query could not be started at
    /// all. In this case, `completion` should simply be dropped.
    fn submit(
        &mut self,
        qname: &str,
        rtype: Rtype,
        completion: Completion,
    ) -> Result<(), io::Error>;

    /// Returns the descriptors the transport currently waits on.
    ///
    /// A descriptor reported here must stay open until a later call no
    /// longer reports it. Event loops keep it registered until then.
    fn interest(&self) -> Interest;

    /// Returns the longest time the transport can wait before being driven.
    ///
    /// If this returns `None`, the transport has no timer running and
    /// should be driven right away.
    fn next_timeout(&self) -> Option<Duration>;

    /// Lets the transport do its work.
    ///
    /// `read` and `write` are descriptors that have become readable or
    /// writable, respectively. If both are `None`, the transport is driven
    /// because time has passed. The transport must consume everything the
    /// ready descriptor has to offer, i.e., read until it would block.
    ///
    /// An error means the transport is broken. It is not used for failed
    /// queries; those are reported through their completions.
    fn drive(
        &mut self,
        read: Option<RawFd>,
        write: Option<RawFd>,
    ) -> Result<(), io::Error>;
}

//------------ Readiness -----------------------------------------------------

/// The directions a descriptor is watched or ready for.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Readiness {
    /// The descriptor is watched or ready for reading.
    pub read: bool,

    /// The descriptor is watched or ready for writing.
    pub write: bool,
}

impl Readiness {
    /// Readable only.
    pub const READ: Readiness = Readiness {
        read: true,
        write: false,
    };

    /// Writable only.
    pub const WRITE: Readiness = Readiness {
        read: false,
        write: true,
    };

    /// Both directions.
    pub const BOTH: Readiness = Readiness {
        read: true,
        write: true,
    };

    /// Returns whether no direction is set.
    pub fn is_empty(self) -> bool {
        !self.read && !self.write
    }

    /// Returns the union of two values.
    #[must_use]
    pub fn union(self, other: Readiness) -> Readiness {
        Readiness {
            read: self.read || other.read,
            write: self.write || other.write,
        }
    }
}

//------------ Interest ------------------------------------------------------

/// The set of descriptors a transport waits on.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Interest {
    /// Descriptors waiting to become readable.
    pub read: Vec<RawFd>,

    /// Descriptors waiting to become writable.
    pub write: Vec<RawFd>,
}

impl Interest {
    /// Creates a new, empty interest set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the transport waits on nothing at all.
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty()
    }

    /// Returns the interest per descriptor.
    ///
    /// A descriptor appearing in both sets appears once with both
    /// directions set.
    pub fn descriptors(&self) -> BTreeMap<RawFd, Readiness> {
        let mut res = BTreeMap::new();
        for &fd in &self.read {
            let entry: &mut Readiness = res.entry(fd).or_default();
            entry.read = true;
        }
        for &fd in &self.write {
            let entry: &mut Readiness = res.entry(fd).or_default();
            entry.write = true;
        }
        res
    }
}

//------------ Completion ----------------------------------------------------

/// The handle a transport completes when a query is done.
///
/// A completion can only be completed once as doing so consumes it. If a
/// transport drops a completion without completing it, for instance because
/// the transport itself is dropped, the query fails with
/// [`QueryError::DESTRUCTION`].
pub struct Completion {
    /// The query this is for.
    key: QueryKey,

    /// The submission this completion belongs to.
    ticket: u64,

    /// Where to put the outcome.
    queue: CompletionQueue,

    /// Has the outcome been queued already?
    done: bool,
}

impl Completion {
    /// Creates a new completion.
    pub(crate) fn new(
        key: QueryKey,
        ticket: u64,
        queue: CompletionQueue,
    ) -> Self {
        Completion {
            key,
            ticket,
            queue,
            done: false,
        }
    }

    /// Returns the key of the query.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Completes the query with the given outcome.
    ///
    /// A successful outcome without any records neither counts as an
    /// answer nor as an error.
    pub fn complete(mut self, outcome: Result<Vec<String>, QueryError>) {
        self.finish(outcome)
    }

    /// Completes the query successfully.
    pub fn succeed(self, records: Vec<String>) {
        self.complete(Ok(records))
    }

    /// Completes the query with an error.
    pub fn fail(self, err: QueryError) {
        self.complete(Err(err))
    }

    /// Queues the outcome.
    fn finish(&mut self, outcome: Result<Vec<String>, QueryError>) {
        if self.done {
            return;
        }
        self.done = true;
        self.queue.push(Finished {
            key: self.key.clone(),
            ticket: self.ticket,
            outcome,
        })
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish(Err(QueryError::DESTRUCTION))
    }
}

//------------ Finished ------------------------------------------------------

/// A query the transport is done with.
#[derive(Debug)]
pub(crate) struct Finished {
    /// The query.
    pub key: QueryKey,

    /// The submission it belongs to.
    pub ticket: u64,

    /// The outcome.
    pub outcome: Result<Vec<String>, QueryError>,
}

//------------ CompletionQueue -----------------------------------------------

/// The queue of finished queries shared between engine and completions.
#[derive(Clone, Debug, Default)]
pub(crate) struct CompletionQueue(Rc<RefCell<Vec<Finished>>>);

impl CompletionQueue {
    /// Adds a finished query.
    fn push(&self, finished: Finished) {
        self.0.borrow_mut().push(finished)
    }

    /// Takes all queued finished queries in order of completion.
    pub(crate) fn take(&self) -> Vec<Finished> {
        self.0.take()
    }
}

//============ Tests =========================================================

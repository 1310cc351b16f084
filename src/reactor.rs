//! Integration with an externally owned event loop.
//!
//! A transport’s interest in descriptors changes whenever it is driven or
//! a query is submitted. An event loop that is not owned by the engine
//! needs to be told about these changes: a descriptor that becomes
//! interesting has to be watched, a watch whose directions changed has to
//! be updated, and a watch for a descriptor no longer of interest has to be
//! removed.
//!
//! The [`Reactor`] trait is the adapter to such an event loop. The
//! [`DescriptorTable`] keeps track of the watches currently established and
//! reconciles them with the transport’s [`Interest`] through
//! [`DescriptorTable::sync`].

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::error::Error;
use crate::transport::{Interest, Readiness};
use std::collections::BTreeMap;
use std::os::unix::io::RawFd;
use tracing::{debug, trace};

//------------ Reactor -------------------------------------------------------

/// An adapter to an event loop watching descriptors.
pub trait Reactor {
    /// The handle for a single watch.
    ///
    /// Dropping the handle should not close the descriptor. The descriptor
    /// belongs to the transport.
    type Watch;

    /// Starts watching a descriptor for the given directions.
    fn register(
        &mut self,
        fd: RawFd,
        interest: Readiness,
    ) -> Result<Self::Watch, Error>;

    /// Changes the directions a descriptor is watched for.
    ///
    /// The old watch is handed over and a new one, which may well be the
    /// same, is returned.
    fn reregister(
        &mut self,
        fd: RawFd,
        watch: Self::Watch,
        interest: Readiness,
    ) -> Result<Self::Watch, Error>;

    /// Stops watching a descriptor.
    fn deregister(&mut self, fd: RawFd, watch: Self::Watch);
}

//------------ DescriptorTable -----------------------------------------------

/// The watches currently established with a reactor.
pub struct DescriptorTable<W> {
    /// The watches by descriptor.
    watches: BTreeMap<RawFd, Entry<W>>,
}

/// A single watch.
struct Entry<W> {
    /// The directions the descriptor is watched for.
    interest: Readiness,

    /// The reactor’s handle for the watch.
    watch: W,
}

impl<W> DescriptorTable<W> {
    /// Creates a new, empty table.
    pub fn new() -> Self {
        DescriptorTable {
            watches: BTreeMap::new(),
        }
    }

    /// Returns whether there are no watches.
    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Returns the number of watched descriptors.
    pub fn len(&self) -> usize {
        self.watches.len()
    }

    /// Returns the directions a descriptor is watched for.
    pub fn interest(&self, fd: RawFd) -> Option<Readiness> {
        self.watches.get(&fd).map(|entry| entry.interest)
    }

    /// Returns an iterator over all watches.
    pub fn iter(&self) -> impl Iterator<Item = (RawFd, Readiness, &W)> {
        self.watches
            .iter()
            .map(|(fd, entry)| (*fd, entry.interest, &entry.watch))
    }

    /// Brings the watches in line with the transport’s interest.
    ///
    /// Watches are removed before new ones are added. If the reactor
    /// fails to establish a watch, the error is returned and the table
    /// contains all watches that did succeed.
    pub fn sync<R: Reactor<Watch = W>>(
        &mut self,
        reactor: &mut R,
        interest: &Interest,
    ) -> Result<(), Error> {
        let wanted = interest.descriptors();

        let stale: Vec<RawFd> = self
            .watches
            .keys()
            .filter(|fd| !wanted.contains_key(fd))
            .copied()
            .collect();
        for fd in stale {
            if let Some(entry) = self.watches.remove(&fd) {
                debug!("descriptor {fd} no longer watched");
                reactor.deregister(fd, entry.watch);
            }
        }

        for (fd, readiness) in wanted {
            match self.watches.remove(&fd) {
                Some(entry) if entry.interest == readiness => {
                    self.watches.insert(fd, entry);
                }
                Some(entry) => {
                    trace!(
                        "descriptor {fd} now watched for {readiness:?} \
                         instead of {:?}",
                        entry.interest
                    );
                    let watch =
                        reactor.reregister(fd, entry.watch, readiness)?;
                    self.watches.insert(
                        fd,
                        Entry {
                            interest: readiness,
                            watch,
                        },
                    );
                }
                None => {
                    debug!("descriptor {fd} watched for {readiness:?}");
                    let watch = reactor.register(fd, readiness)?;
                    self.watches.insert(
                        fd,
                        Entry {
                            interest: readiness,
                            watch,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Removes all watches.
    pub fn clear<R: Reactor<Watch = W>>(&mut self, reactor: &mut R) {
        for (fd, entry) in std::mem::take(&mut self.watches) {
            reactor.deregister(fd, entry.watch)
        }
    }
}

impl<W> Default for DescriptorTable<W> {
    fn default() -> Self {
        Self::new()
    }
}

//============ Tests =========================================================

//! The query coordinator.
//!
//! A [`Resolver`] accepts queries, makes sure each distinct query goes to
//! the transport only once, and collects the answers per queried name. It
//! does not do any I/O itself. The transport is driven either by
//! [`Resolver::run`], which blocks until everything has settled, or by a
//! [`Session`] on a tokio event loop.
//!
//! ```no_run
//! # #[cfg(feature = "udp")]
//! # fn main() -> Result<(), domain_mux::Error> {
//! use domain_mux::{Config, Resolver, UdpTransport};
//!
//! let mut resolver = Resolver::new(UdpTransport::system(), Config::new());
//! resolver.ptr("8.8.8.8".parse().unwrap(), None)?;
//! resolver.query_a("heise.de", None)?;
//! resolver.query_aaaa("heise.de", None)?;
//! resolver.run()?;
//! for (name, records) in resolver.results(false) {
//!     println!("{name}: {}", records.join(", "));
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "udp"))]
//! # fn main() {}
//! ```
//!
//! [`Session`]: crate::session::Session

use crate::config::Config;
use crate::error::Error;
use crate::iana::Rtype;
use crate::ledger::{Admission, Ledger};
use crate::poll::PollLoop;
use crate::query::{
    deliver_all, qualify, reverse_name, split_batch, BatchCallback, Callback,
    Delivery, QueryKey,
};
use crate::status::QueryError;
use crate::transport::{Completion, CompletionQueue, Interest, Transport};
use std::net::IpAddr;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};
use tracing::{error, trace};

//------------ Resolver ------------------------------------------------------

/// A deduplicating, aggregating DNS query coordinator.
///
/// All queries submitted to a resolver share one transport. Submitting a
/// query that is already out with the transport does not send it again;
/// submitting one that has been answered before replays the known records
/// right away. Records for the same name are merged across record types.
///
/// Submission methods take an optional [`Callback`] that is called once
/// the query has settled. Callbacks for answers to earlier queries are
/// called before the submission method returns.
pub struct Resolver<T> {
    /// The transport doing the actual network exchange.
    transport: T,

    /// The state of all queries.
    ledger: Ledger,

    /// Completions queued by the transport but not yet processed.
    queue: CompletionQueue,

    /// Configuration.
    config: Config,
}

/// # Management
///
impl<T: Transport> Resolver<T> {
    /// Creates a new resolver atop the given transport.
    pub fn new(transport: T, config: Config) -> Self {
        Resolver {
            transport,
            ledger: Ledger::default(),
            queue: CompletionQueue::default(),
            config,
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns the number of queries currently out with the transport.
    pub fn pending(&self) -> usize {
        self.ledger.pending()
    }

    /// Returns whether a query is currently out with the transport.
    pub fn is_pending(&self, rtype: Rtype, name: &str) -> bool {
        self.ledger.is_pending(&QueryKey::new(rtype, name))
    }

    /// Returns whether a query has been answered before.
    ///
    /// Submitting such a query again replays the known records.
    pub fn is_answered(&self, rtype: Rtype, name: &str) -> bool {
        self.ledger.is_completed(&QueryKey::new(rtype, name))
    }
}

/// # Queries
///
impl<T: Transport> Resolver<T> {
    /// Queries the host names for an address.
    ///
    /// The records are stored and reported under the textual form of the
    /// address.
    pub fn ptr(
        &mut self,
        addr: IpAddr,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        let name = addr.to_string();
        self.submit_as(Rtype::PTR, &name, reverse_name(addr), callback)
    }

    /// Queries the host names for a number of addresses.
    pub fn ptrs(
        &mut self,
        addrs: impl IntoIterator<Item = IpAddr>,
        callback: Option<BatchCallback>,
    ) -> Result<(), Error> {
        for addr in addrs {
            self.ptr(addr, split_batch(&callback))?;
        }
        Ok(())
    }

    /// Queries the IPv4 addresses of a host.
    pub fn query_a(
        &mut self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::A, name, callback)
    }

    /// Queries the IPv6 addresses of a host.
    pub fn query_aaaa(
        &mut self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::AAAA, name, callback)
    }

    /// Queries the name servers of a zone.
    pub fn query_ns(
        &mut self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::NS, name, callback)
    }

    /// Queries records of any type for a name.
    ///
    /// Whether the transport can handle the record type is up to the
    /// transport.
    pub fn query(
        &mut self,
        rtype: Rtype,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.submit_as(rtype, name, qualify(name), callback)
    }

    /// Queries records of one type for a number of names.
    ///
    /// Each name is an independent query. If submitting one of them fails,
    /// the remaining names are not submitted.
    pub fn query_many<'a>(
        &mut self,
        rtype: Rtype,
        names: impl IntoIterator<Item = &'a str>,
        callback: Option<BatchCallback>,
    ) -> Result<(), Error> {
        for name in names {
            self.query(rtype, name, split_batch(&callback))?;
        }
        Ok(())
    }

    /// Submits a query and delivers everything that settled meanwhile.
    fn submit_as(
        &mut self,
        rtype: Rtype,
        name: &str,
        qname: String,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        let deliveries = self.submit_deferred(rtype, name, qname, callback)?;
        deliver_all(deliveries);
        Ok(())
    }

    /// Submits a query without invoking any callbacks.
    ///
    /// The callbacks that are due are returned instead.
    pub(crate) fn submit_deferred(
        &mut self,
        rtype: Rtype,
        name: &str,
        qname: String,
        callback: Option<Callback>,
    ) -> Result<Vec<Delivery>, Error> {
        let key = QueryKey::new(rtype, name);
        let ticket = match self.ledger.admit(&key) {
            Admission::Replay(records) => {
                return Ok(vec![Delivery::new(
                    name.into(),
                    Ok(records),
                    callback.into_iter().collect(),
                )])
            }
            Admission::Pending => {
                self.ledger.join(&key, callback);
                return Ok(Vec::new());
            }
            Admission::Submit(ticket) => ticket,
        };
        let completion =
            Completion::new(key.clone(), ticket, self.queue.clone());
        trace!("submitting {qname} {rtype}");
        if let Err(err) = self.transport.submit(&qname, rtype, completion) {
            error!("query {qname} {rtype} failed to start: {err}");
            // The dropped completion stays queued and is discarded as
            // stale when the queue is next processed.
            return Err(Error::submit(&qname, rtype, err));
        }
        self.ledger.submitted(key, ticket, callback);
        Ok(self.settle())
    }
}

/// # Results
///
impl<T> Resolver<T> {
    /// Returns the records found so far, ordered by name.
    ///
    /// Each name appears once with the sorted records of all record types
    /// queried for it. If `clear` is `true`, the results are removed.
    /// Queries answered before then are forgotten as well and will be sent
    /// to the transport again when submitted next.
    pub fn results(&mut self, clear: bool) -> Vec<(String, Vec<String>)> {
        self.ledger.results(clear)
    }

    /// Returns the distinct errors seen so far.
    ///
    /// If `clear` is `true`, the errors are removed.
    pub fn errors(&mut self, clear: bool) -> Vec<QueryError> {
        self.ledger.errors(clear)
    }
}

/// # Driving the Transport
///
impl<T: Transport> Resolver<T> {
    /// Returns the descriptors the transport currently waits on.
    pub fn interest(&self) -> Interest {
        self.transport.interest()
    }

    /// Returns how long the transport can wait before being driven.
    ///
    /// If a query deadline is configured, the time until the next pending
    /// query runs out is taken into account as well.
    pub fn next_timeout(&self) -> Option<Duration> {
        let timeout = self.transport.next_timeout()?;
        match self.next_expiry() {
            Some(expiry) => Some(timeout.min(expiry)),
            None => Some(timeout),
        }
    }

    /// Returns the time until the next pending query runs out.
    ///
    /// Returns `None` if no query deadline is configured or nothing is
    /// pending.
    pub fn next_expiry(&self) -> Option<Duration> {
        let deadline = self.config.query_deadline()?;
        self.ledger.next_expiry(Instant::now(), deadline)
    }

    /// Drives the transport and delivers everything that settled.
    ///
    /// This is what an event loop calls whenever a descriptor of the
    /// transport has become ready or its timeout has passed. See
    /// [`Transport::drive`] for the meaning of the arguments.
    pub fn drive(
        &mut self,
        read: Option<RawFd>,
        write: Option<RawFd>,
    ) -> Result<(), Error> {
        let (deliveries, res) = self.drive_deferred(read, write);
        deliver_all(deliveries);
        res
    }

    /// Drives the transport without invoking any callbacks.
    ///
    /// Queries that completed before the transport failed are settled and
    /// returned even if driving failed.
    pub(crate) fn drive_deferred(
        &mut self,
        read: Option<RawFd>,
        write: Option<RawFd>,
    ) -> (Vec<Delivery>, Result<(), Error>) {
        trace!("driving transport (read {read:?}, write {write:?})");
        let res = self.transport.drive(read, write);
        let deliveries = self.settle();
        let res = res.map_err(|err| {
            error!(
                "driving transport failed \
                 (read {read:?}, write {write:?}): {err}"
            );
            Error::drive(read, write, err)
        });
        (deliveries, res)
    }

    /// Fails queries that have been pending for too long.
    ///
    /// Does nothing unless a query deadline is configured.
    pub(crate) fn expire_deferred(&mut self, now: Instant) -> Vec<Delivery> {
        match self.config.query_deadline() {
            Some(deadline) => self.ledger.expire(now, deadline),
            None => Vec::new(),
        }
    }

    /// Runs the transport until all queries have settled.
    ///
    /// This blocks the current thread. It returns once there are no more
    /// pending queries or the transport does not wait on any descriptor
    /// anymore. In the latter case, if a query deadline is configured, it
    /// first waits for the remaining queries to run out.
    pub fn run(&mut self) -> Result<(), Error> {
        PollLoop::new().run(self)
    }

    /// Processes all queued completions.
    fn settle(&mut self) -> Vec<Delivery> {
        self.queue
            .take()
            .into_iter()
            .filter_map(|finished| self.ledger.finish(finished))
            .collect()
    }
}

//============ Tests =========================================================

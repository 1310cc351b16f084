//! Running a resolver on a tokio event loop.
//!
//! A [`Session`] hands a [`Resolver`] to a background task that watches the
//! transport’s descriptors with tokio and drives the transport whenever
//! one of them becomes ready. Submitting queries through the session never
//! blocks. Callbacks are invoked from the background task, or from the
//! submission method for answers known already.
//!
//! Because the resolver is not `Send`, the session has to be created
//! inside a [`LocalSet`].
//!
//! [`LocalSet`]: tokio::task::LocalSet

use crate::config::Config;
use crate::error::Error;
use crate::iana::Rtype;
use crate::query::{
    deliver_all, qualify, reverse_name, split_batch, BatchCallback, Callback,
    Delivery,
};
use crate::reactor::{DescriptorTable, Reactor};
use crate::resolver::Resolver;
use crate::status::QueryError;
use crate::transport::{Readiness, Transport};
use futures_util::future::select_all;
use std::cell::RefCell;
use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::io::{Interest, Ready};
use tokio::sync::{watch, Notify};
use tracing::{debug, trace};

//------------ Session -------------------------------------------------------

/// A resolver driven by a tokio event loop.
///
/// Sessions are cheap to clone. All clones refer to the same resolver. The
/// background task ends once the last clone is dropped or driving the
/// transport failed.
pub struct Session<T> {
    /// The state shared with the background task.
    shared: Rc<Shared<T>>,

    /// Wakes up the background task.
    wake: Rc<Notify>,
}

/// The state shared between a session and its background task.
struct Shared<T> {
    /// The resolver.
    resolver: RefCell<Resolver<T>>,

    /// Publishes the progress of the resolver.
    progress: watch::Sender<Progress>,
}

/// What a session’s background task has to say.
#[derive(Clone, Debug, Default)]
struct Progress {
    /// The number of pending queries.
    pending: usize,

    /// The error that ended the background task.
    failure: Option<Error>,
}

impl<T: Transport + 'static> Session<T> {
    /// Creates a new session for a resolver.
    ///
    /// This spawns the background task via [`tokio::task::spawn_local`]
    /// and must therefore be called from within a `LocalSet`.
    pub fn new(resolver: Resolver<T>) -> Self {
        let progress = Progress {
            pending: resolver.pending(),
            failure: None,
        };
        let shared = Rc::new(Shared {
            resolver: RefCell::new(resolver),
            progress: watch::channel(progress).0,
        });
        let wake = Rc::new(Notify::new());
        tokio::task::spawn_local(drive_session(
            Rc::downgrade(&shared),
            wake.clone(),
        ));
        Session { shared, wake }
    }

    /// Creates a session for a new resolver atop the given transport.
    pub fn with_transport(transport: T, config: Config) -> Self {
        Self::new(Resolver::new(transport, config))
    }
}

/// # Queries
///
/// These mirror the submission methods of [`Resolver`].
impl<T: Transport> Session<T> {
    /// Queries the host names for an address.
    pub fn ptr(
        &self,
        addr: IpAddr,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        let name = addr.to_string();
        self.submit(Rtype::PTR, &name, reverse_name(addr), callback)
    }

    /// Queries the host names for a number of addresses.
    pub fn ptrs(
        &self,
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
        &self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::A, name, callback)
    }

    /// Queries the IPv6 addresses of a host.
    pub fn query_aaaa(
        &self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::AAAA, name, callback)
    }

    /// Queries the name servers of a zone.
    pub fn query_ns(
        &self,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.query(Rtype::NS, name, callback)
    }

    /// Queries records of any type for a name.
    pub fn query(
        &self,
        rtype: Rtype,
        name: &str,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        self.submit(rtype, name, qualify(name), callback)
    }

    /// Queries records of one type for a number of names.
    pub fn query_many<'a>(
        &self,
        rtype: Rtype,
        names: impl IntoIterator<Item = &'a str>,
        callback: Option<BatchCallback>,
    ) -> Result<(), Error> {
        for name in names {
            self.query(rtype, name, split_batch(&callback))?;
        }
        Ok(())
    }

    /// Submits a query and wakes up the background task.
    fn submit(
        &self,
        rtype: Rtype,
        name: &str,
        qname: String,
        callback: Option<Callback>,
    ) -> Result<(), Error> {
        let res = self
            .shared
            .resolver
            .borrow_mut()
            .submit_deferred(rtype, name, qname, callback);
        let deliveries = res?;
        self.shared.publish(None);
        self.wake.notify_one();
        deliver_all(deliveries);
        Ok(())
    }
}

/// # Results
///
impl<T> Session<T> {
    /// Returns the records found so far, ordered by name.
    ///
    /// See [`Resolver::results`] for details.
    pub fn results(&self, clear: bool) -> Vec<(String, Vec<String>)> {
        self.shared.resolver.borrow_mut().results(clear)
    }

    /// Returns the distinct errors seen so far.
    pub fn errors(&self, clear: bool) -> Vec<QueryError> {
        self.shared.resolver.borrow_mut().errors(clear)
    }

    /// Returns the number of pending queries.
    pub fn pending(&self) -> usize {
        self.shared.progress.borrow().pending
    }

    /// Waits until no query is pending anymore.
    ///
    /// Returns an error if the background task failed before that. Queries
    /// pending at that point will never settle.
    pub async fn settled(&self) -> Result<(), Error> {
        let mut progress = self.shared.progress.subscribe();
        loop {
            {
                let current = progress.borrow_and_update();
                if let Some(err) = current.failure.as_ref() {
                    return Err(err.clone());
                }
                if current.pending == 0 {
                    return Ok(());
                }
            }
            // The sender lives in `self.shared`, so this cannot fail.
            let _ = progress.changed().await;
        }
    }
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Session {
            shared: self.shared.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        if Rc::strong_count(&self.shared) == 1 {
            // Let the background task notice it is no longer needed.
            self.wake.notify_one();
        }
    }
}

impl<T> Shared<T> {
    /// Publishes the current number of pending queries and a failure.
    fn publish(&self, failure: Option<Error>)
    where
        T: Transport,
    {
        let pending = self.resolver.borrow().pending();
        self.progress.send_modify(|progress| {
            progress.pending = pending;
            if failure.is_some() {
                progress.failure = failure;
            }
        });
    }
}

//------------ The Background Task -------------------------------------------

/// What woke up the background task.
enum Event {
    /// A descriptor became ready.
    Ready(RawFd, Result<Ready, std::io::Error>),

    /// The tick passed.
    Tick,

    /// Something changed.
    Wake,
}

/// Drives the resolver of a session until the session is gone.
async fn drive_session<T: Transport>(
    shared: Weak<Shared<T>>,
    wake: Rc<Notify>,
) {
    let mut reactor = TokioReactor;
    let mut table = DescriptorTable::new();
    loop {
        let Some(current) = shared.upgrade() else {
            break;
        };
        let deliveries = current
            .resolver
            .borrow_mut()
            .expire_deferred(Instant::now());
        settle(&current, deliveries, Ok(()));

        let (interest, timeout, expiry, tick) = {
            let resolver = current.resolver.borrow();
            (
                resolver.interest(),
                resolver.next_timeout(),
                resolver.next_expiry(),
                resolver.config().reactor_tick(),
            )
        };
        if let Err(err) = table.sync(&mut reactor, &interest) {
            settle(&current, Vec::new(), Err(err));
            break;
        }
        drop(current);

        if table.is_empty() {
            match expiry {
                Some(expiry) => {
                    trace!("no descriptors to watch, expiring in {expiry:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(expiry) => {}
                        _ = wake.notified() => {}
                    }
                }
                None => {
                    trace!("no descriptors to watch, idling");
                    wake.notified().await;
                }
            }
            continue;
        }

        let sleep = timeout
            .map(|timeout| timeout.min(tick))
            .unwrap_or(Duration::ZERO);
        let event = {
            let ready = select_all(table.iter().map(|(fd, _, watch)| {
                Box::pin(async move { (fd, watch.ready().await) })
            }));
            tokio::select! {
                ((fd, res), _, _) = ready => Event::Ready(fd, res),
                _ = tokio::time::sleep(sleep) => Event::Tick,
                _ = wake.notified() => Event::Wake,
            }
        };

        let (read, write) = match event {
            Event::Ready(fd, Ok(ready)) => directions(fd, ready),
            Event::Ready(fd, Err(err)) => {
                if let Some(current) = shared.upgrade() {
                    let err = Error::register(fd, err);
                    settle(&current, Vec::new(), Err(err));
                }
                break;
            }
            Event::Tick => (None, None),
            Event::Wake => continue,
        };
        let Some(current) = shared.upgrade() else {
            break;
        };
        let (deliveries, res) =
            current.resolver.borrow_mut().drive_deferred(read, write);
        if !settle(&current, deliveries, res) {
            break;
        }
    }
    debug!("session task finished");
    table.clear(&mut reactor);
}

/// Publishes progress and invokes callbacks after the resolver was used.
///
/// Returns whether the background task should carry on.
fn settle<T: Transport>(
    shared: &Shared<T>,
    deliveries: Vec<Delivery>,
    res: Result<(), Error>,
) -> bool {
    deliver_all(deliveries);
    let failure = res.err();
    let carry_on = failure.is_none();
    shared.publish(failure);
    carry_on
}

/// Returns the directions to drive the transport with.
///
/// Error readiness drives both directions.
fn directions(fd: RawFd, ready: Ready) -> (Option<RawFd>, Option<RawFd>) {
    if ready.is_error() {
        debug!("descriptor {fd} reported an error");
        return (Some(fd), Some(fd));
    }
    (
        ready.is_readable().then_some(fd),
        ready.is_writable().then_some(fd),
    )
}

//------------ TokioReactor --------------------------------------------------

/// A reactor watching descriptors with tokio.
struct TokioReactor;

impl TokioReactor {
    /// Creates the watch for a descriptor.
    fn watch(fd: RawFd, interest: Readiness) -> Result<TokioWatch, Error> {
        let interest = tokio_interest(interest);
        // SAFETY: Transports keep a reported descriptor open until a later
        // interest no longer contains it. That is when the descriptor
        // table drops the watch.
        let res = unsafe {
            AsyncFd::register_with_interest(Descriptor(fd), interest)
        };
        res.map(|fd| TokioWatch { fd, interest })
            .map_err(|err| Error::register(fd, err.into()))
    }
}

impl Reactor for TokioReactor {
    type Watch = TokioWatch;

    fn register(
        &mut self,
        fd: RawFd,
        interest: Readiness,
    ) -> Result<TokioWatch, Error> {
        Self::watch(fd, interest)
    }

    fn reregister(
        &mut self,
        fd: RawFd,
        watch: TokioWatch,
        interest: Readiness,
    ) -> Result<TokioWatch, Error> {
        // The interest of an `AsyncFd` is fixed, so register anew.
        drop(watch);
        Self::watch(fd, interest)
    }

    fn deregister(&mut self, _fd: RawFd, watch: TokioWatch) {
        drop(watch)
    }
}

/// Converts readiness into a tokio interest.
fn tokio_interest(interest: Readiness) -> Interest {
    let mut res = Interest::ERROR;
    if interest.read {
        res = res.add(Interest::READABLE);
    }
    if interest.write {
        res = res.add(Interest::WRITABLE);
    }
    res
}

//------------ TokioWatch ----------------------------------------------------

/// A descriptor registered with tokio.
struct TokioWatch {
    /// The registration.
    fd: AsyncFd<Descriptor>,

    /// The interest the descriptor is registered with.
    interest: Interest,
}

impl TokioWatch {
    /// Waits for the descriptor to become ready.
    ///
    /// The readiness is cleared again before it is returned. The transport
    /// reads until it would block when driven.
    async fn ready(&self) -> Result<Ready, std::io::Error> {
        let mut guard = self.fd.ready(self.interest).await?;
        let ready = guard.ready();
        guard.clear_ready();
        Ok(ready)
    }
}

//------------ Descriptor ----------------------------------------------------

/// A descriptor owned by someone else.
///
/// Dropping it does not close the descriptor.
struct Descriptor(RawFd);

impl AsRawFd for Descriptor {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::ScriptedTransport;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn deadline_expires_idle_transport() {
        LocalSet::new()
            .run_until(async {
                let mut config = Config::new();
                config.set_query_deadline(Some(Duration::from_millis(50)));
                let mut transport = ScriptedTransport::new();
                transport.set_idle(true);
                let session = Session::with_transport(transport, config);
                session.query_a("stuck.example", None).unwrap();
                assert_eq!(session.pending(), 1);
                let settled = session.settled();
                tokio::time::timeout(Duration::from_secs(2), settled)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(session.errors(false), [QueryError::TIMEOUT]);
            })
            .await;
    }

    #[test]
    fn error_drives_both_directions() {
        assert_eq!(directions(5, Ready::ERROR), (Some(5), Some(5)));
        assert_eq!(directions(5, Ready::READABLE), (Some(5), None));
        assert_eq!(
            directions(5, Ready::READABLE | Ready::WRITABLE),
            (Some(5), Some(5))
        );
    }

    #[test]
    fn interest_always_includes_errors() {
        assert!(tokio_interest(Readiness::READ).is_error());
        assert!(tokio_interest(Readiness::READ).is_readable());
        assert!(!tokio_interest(Readiness::READ).is_writable());
        assert!(tokio_interest(Readiness::WRITE).is_writable());
    }
}

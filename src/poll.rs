//! A blocking event loop based on `poll(2)`.
//!
//! The [`PollLoop`] owns the thread it runs on. It repeatedly asks the
//! resolver which descriptors its transport waits on, blocks until one of
//! them becomes ready or the transport’s timeout passes, and then drives
//! the transport accordingly. It stops once the transport does not wait on
//! anything anymore or no query is pending. If a query deadline is
//! configured, it waits for pending queries to run out instead.

use crate::error::Error;
use crate::query::deliver_all;
use crate::resolver::Resolver;
use crate::transport::{Readiness, Transport};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

//------------ PollLoop ------------------------------------------------------

/// A synchronous drain loop.
///
/// The loop keeps its descriptor buffer between runs, so it can be reused
/// for driving the same or another resolver again.
#[derive(Default)]
pub struct PollLoop {
    /// The descriptors handed to `poll(2)`.
    fds: Vec<libc::pollfd>,
}

impl PollLoop {
    /// Creates a new poll loop.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drives the resolver’s transport until everything has settled.
    ///
    /// Returns an error if waiting for readiness or driving the transport
    /// fails. Interrupted waits are retried. Any other failure ends the
    /// run; the queries still pending at that point stay pending.
    pub fn run<T: Transport>(
        &mut self,
        resolver: &mut Resolver<T>,
    ) -> Result<(), Error> {
        loop {
            deliver_all(resolver.expire_deferred(Instant::now()));
            if resolver.pending() == 0 {
                trace!("nothing pending, leaving poll loop");
                return Ok(());
            }
            let interest = resolver.interest();
            if interest.is_empty() {
                debug!(
                    "transport waits on nothing with {} queries pending",
                    resolver.pending()
                );
                match resolver.next_expiry() {
                    Some(expiry) => {
                        trace!("sleeping {expiry:?} until queries expire");
                        thread::sleep(expiry);
                        continue;
                    }
                    None => return Ok(()),
                }
            }

            let timeout = match resolver.next_timeout() {
                Some(timeout) if !timeout.is_zero() => timeout,
                _ => {
                    resolver.drive(None, None)?;
                    continue;
                }
            };

            self.fds.clear();
            self.fds.extend(interest.descriptors().into_iter().map(
                |(fd, readiness)| libc::pollfd {
                    fd,
                    events: events(readiness),
                    revents: 0,
                },
            ));
            if self.wait(timeout)? == 0 {
                trace!("poll timed out after {timeout:?}");
                resolver.drive(None, None)?;
                continue;
            }
            for item in &self.fds {
                dispatch(resolver, item.fd, item.revents)?;
            }
        }
    }

    /// Waits for readiness of the descriptors in `self.fds`.
    ///
    /// Returns the number of ready descriptors.
    fn wait(&mut self, timeout: Duration) -> Result<usize, Error> {
        let timeout = poll_timeout(timeout);
        loop {
            let res = unsafe {
                libc::poll(
                    self.fds.as_mut_ptr(),
                    self.fds.len() as libc::nfds_t,
                    timeout,
                )
            };
            if let Ok(res) = usize::try_from(res) {
                return Ok(res);
            }
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("poll interrupted, retrying");
                continue;
            }
            error!("poll on {} descriptors failed: {err}", self.fds.len());
            return Err(Error::Poll(Arc::new(err)));
        }
    }
}

/// Drives the transport for one polled descriptor.
///
/// Each ready direction gets its own drive. Errors and hang-ups drive the
/// transport in both directions at once so it gets to see the failure.
fn dispatch<T: Transport>(
    resolver: &mut Resolver<T>,
    fd: RawFd,
    revents: libc::c_short,
) -> Result<(), Error> {
    if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        debug!("descriptor {fd} reported error or hang-up");
        return resolver.drive(Some(fd), Some(fd));
    }
    if revents & libc::POLLIN != 0 {
        resolver.drive(Some(fd), None)?;
    }
    if revents & libc::POLLOUT != 0 {
        resolver.drive(None, Some(fd))?;
    }
    Ok(())
}

/// Returns the `poll(2)` events for the given interest.
fn events(readiness: Readiness) -> libc::c_short {
    let mut res = 0;
    if readiness.read {
        res |= libc::POLLIN;
    }
    if readiness.write {
        res |= libc::POLLOUT;
    }
    res
}

/// Converts a timeout into milliseconds for `poll(2)`.
///
/// The value is rounded up so a sub-millisecond timeout does not turn into
/// a busy loop.
fn poll_timeout(timeout: Duration) -> libc::c_int {
    let millis = (timeout.as_nanos() + 999_999) / 1_000_000;
    libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
}

//============ Tests =========================================================

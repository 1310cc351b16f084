//! Error type for the query engine.
//!
//! Failures of individual queries are not errors in this sense. They are
//! reported as a [`QueryError`] through the completion path. The type here
//! covers faults of the machinery itself: a transport refusing a query,
//! a transport failing while being driven, or the event loop breaking.
//!
//! [`QueryError`]: crate::status::QueryError

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::iana::Rtype;
use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// Error type for the query engine.
#[derive(Clone, Debug)]
pub enum Error {
    /// The transport failed to accept a query.
    Submit {
        /// The name handed to the transport.
        qname: String,

        /// The record type asked for.
        rtype: Rtype,

        /// What went wrong.
        source: Arc<io::Error>,
    },

    /// Driving the transport failed.
    Drive {
        /// The descriptor reported as readable, if any.
        read: Option<RawFd>,

        /// The descriptor reported as writable, if any.
        write: Option<RawFd>,

        /// What went wrong.
        source: Arc<io::Error>,
    },

    /// Waiting for descriptor readiness failed.
    Poll(Arc<io::Error>),

    /// A descriptor could not be registered with the reactor.
    Register {
        /// The descriptor in question.
        fd: RawFd,

        /// What went wrong.
        source: Arc<io::Error>,
    },
}

impl Error {
    /// Creates a submit error.
    pub(crate) fn submit(qname: &str, rtype: Rtype, err: io::Error) -> Self {
        Error::Submit {
            qname: qname.into(),
            rtype,
            source: Arc::new(err),
        }
    }

    /// Creates a drive error.
    pub(crate) fn drive(
        read: Option<RawFd>,
        write: Option<RawFd>,
        err: io::Error,
    ) -> Self {
        Error::Drive {
            read,
            write,
            source: Arc::new(err),
        }
    }

    /// Creates a registration error.
    pub(crate) fn register(fd: RawFd, err: io::Error) -> Self {
        Error::Register {
            fd,
            source: Arc::new(err),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::Submit { qname, rtype, .. } => {
                write!(f, "transport rejected query {qname} {rtype}")
            }
            Error::Drive { read, write, .. } => {
                write!(f, "error driving transport (read: ")?;
                fmt_fd(*read, f)?;
                write!(f, ", write: ")?;
                fmt_fd(*write, f)?;
                write!(f, ")")
            }
            Error::Poll(_) => write!(f, "error waiting for readiness"),
            Error::Register { fd, .. } => {
                write!(f, "error registering descriptor {fd}")
            }
        }
    }
}

/// Writes an optional descriptor.
fn fmt_fd(fd: Option<RawFd>, f: &mut Formatter<'_>) -> std::fmt::Result {
    match fd {
        Some(fd) => write!(f, "{fd}"),
        None => write!(f, "-"),
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Submit { source, .. } => Some(source),
            Error::Drive { source, .. } => Some(source),
            Error::Poll(e) => Some(e),
            Error::Register { source, .. } => Some(source),
        }
    }
}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn drive_error_names_descriptors() {
        let err = Error::drive(Some(7), None, io::ErrorKind::Other.into());
        assert_eq!(
            err.to_string(),
            "error driving transport (read: 7, write: -)"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn submit_error_names_query() {
        let err = Error::submit(
            "example.com.",
            Rtype::AAAA,
            io::ErrorKind::InvalidInput.into(),
        );
        assert_eq!(
            err.to_string(),
            "transport rejected query example.com. AAAA"
        );
    }
}

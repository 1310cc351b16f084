//! IANA Definitions for DNS.
//!
//! Only the registry needed to name a query lives here: resource record
//! types. Like all code types of this crate, [`Rtype`] is a thin wrapper
//! around its raw integer with associated constants for the well-known
//! values. Values without a constant are still perfectly valid and are
//! carried around verbatim.

pub use self::rtype::Rtype;

#[macro_use]
mod macros;

pub mod rtype;

//! A deduplicating, multiplexing DNS query engine.
//!
//! This crate sits between an application that wants to resolve a batch of
//! names and addresses and a transport that does the actual talking to name
//! servers. It makes sure that each distinct query is sent only once, merges
//! the answers for the same name across record types, and collects the
//! errors that happened along the way.
//!
//! The central type is the [`Resolver`]. Queries are submitted through its
//! typed methods such as [`Resolver::query_a`] or [`Resolver::ptr`], each of
//! which takes an optional callback. The accumulated answers are available
//! via [`Resolver::results`] and the distinct errors via
//! [`Resolver::errors`].
//!
//! The resolver does no I/O itself. It hands every query to a [`Transport`]
//! which tells the resolver which descriptors it waits on and how long it
//! can wait. There are two ways to drive a transport:
//!
//! * [`Resolver::run`] blocks the current thread in a `poll(2)` loop until
//!   every query has settled, and
#![cfg_attr(feature = "tokio", doc = "* a [`Session`]")]
#![cfg_attr(not(feature = "tokio"), doc = "* a `Session`")]
//!   runs the resolver on a tokio event loop and never blocks.
//!
//! Other event loops can be integrated through the [`Reactor`] trait.
//!
//! # Modules
//!
//! * [iana] contains the record type code,
//! * [status] contains the query error codes,
//! * [query] describes queries and callbacks,
//! * [transport] defines the interface to transports,
//! * [resolver] contains the query coordinator,
//! * [poll] and [reactor] drive transports, and
//! * [config] and [conf] configure the engine and the UDP transport.
//!
//! # Reference of Feature Flags
//!
//! * `tokio`: Enables the
#![cfg_attr(feature = "tokio", doc = "  [session]")]
#![cfg_attr(not(feature = "tokio"), doc = "  session")]
//!   module for running a resolver atop the
//!   [Tokio](https://tokio.rs/) async runtime. This is enabled by default.
//! * `udp`: Enables the
#![cfg_attr(feature = "udp", doc = "  [udp]")]
#![cfg_attr(not(feature = "udp"), doc = "  udp")]
//!   module with a transport sending queries over UDP. It uses the
//!   [domain](https://github.com/nlnetlabs/domain) crate for message
//!   handling.
//!
//! [`Reactor`]: crate::reactor::Reactor
#![cfg_attr(feature = "tokio", doc = "[`Session`]: crate::session::Session")]
#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub mod iana;
pub mod conf;
pub mod config;
pub mod error;
mod ledger;
pub mod poll;
pub mod query;
pub mod reactor;
pub mod resolver;
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod session;
pub mod status;
#[cfg(test)]
mod testing;
pub mod transport;
#[cfg(feature = "udp")]
#[cfg_attr(docsrs, doc(cfg(feature = "udp")))]
pub mod udp;

pub use self::config::Config;
pub use self::error::Error;
pub use self::iana::Rtype;
pub use self::query::{reverse_name, BatchCallback, Callback, QueryKey};
pub use self::resolver::Resolver;
#[cfg(feature = "tokio")]
pub use self::session::Session;
pub use self::status::QueryError;
pub use self::transport::{Completion, Interest, Readiness, Transport};
#[cfg(feature = "udp")]
pub use self::udp::UdpTransport;

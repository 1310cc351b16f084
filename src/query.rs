//! What a query is and how callers learn about its outcome.

use crate::iana::Rtype;
use crate::status::QueryError;
use std::fmt;
use std::fmt::Write;
use std::net::IpAddr;
use std::rc::Rc;

//------------ QueryKey ------------------------------------------------------

/// Identifies one logical query.
///
/// The key consists of the record type and the name as the caller gave it.
/// For PTR queries, this is the textual address rather than the reverse
/// name actually sent. Two submissions with equal keys are the same query
/// as far as deduplication and result caching are concerned.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryKey {
    /// The record type asked for.
    rtype: Rtype,

    /// The name as given by the caller.
    name: String,
}

impl QueryKey {
    /// Creates a new key.
    pub fn new(rtype: Rtype, name: impl Into<String>) -> Self {
        QueryKey {
            rtype,
            name: name.into(),
        }
    }

    /// Returns the record type of the query.
    pub fn rtype(&self) -> Rtype {
        self.rtype
    }

    /// Returns the name the query was submitted for.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.rtype)
    }
}

//------------ Callback ------------------------------------------------------

/// A callback invoked once a query has settled.
///
/// The callback receives the name the query was submitted for and either
/// the records or the error. For a query answered from a previous
/// successful run, the records are everything known for the name so far.
/// Otherwise they are the records of this query only.
pub type Callback = Box<dyn FnOnce(&str, Result<&[String], QueryError>)>;

/// A callback shared by all queries of a batch.
pub type BatchCallback = Rc<dyn Fn(&str, Result<&[String], QueryError>)>;

/// Turns a batch callback into a callback for a single query.
pub(crate) fn split_batch(
    callback: &Option<BatchCallback>,
) -> Option<Callback> {
    callback.as_ref().map(|callback| {
        let callback = callback.clone();
        Box::new(move |name: &str, res: Result<&[String], QueryError>| {
            callback(name, res)
        }) as Callback
    })
}

//------------ Delivery ------------------------------------------------------

/// The outcome of a query together with everyone waiting for it.
///
/// Deliveries are produced while the engine’s state is being updated and
/// handed out only afterwards. This way, callbacks never run while the
/// transport or the state are borrowed.
pub(crate) struct Delivery {
    /// The name the query was submitted for.
    name: String,

    /// The outcome.
    outcome: Result<Vec<String>, QueryError>,

    /// The callbacks to invoke.
    callbacks: Vec<Callback>,
}

impl Delivery {
    pub(crate) fn new(
        name: String,
        outcome: Result<Vec<String>, QueryError>,
        callbacks: Vec<Callback>,
    ) -> Self {
        Delivery {
            name,
            outcome,
            callbacks,
        }
    }

    /// Invokes all callbacks.
    pub(crate) fn deliver(self) {
        let outcome = match &self.outcome {
            Ok(records) => Ok(records.as_slice()),
            Err(err) => Err(*err),
        };
        for callback in self.callbacks {
            callback(&self.name, outcome)
        }
    }
}

/// Delivers a list of deliveries in order.
pub(crate) fn deliver_all(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.deliver()
    }
}

//------------ Names ---------------------------------------------------------

/// Returns the absolute form of a name.
///
/// The name is sent to the transport with a trailing dot so it is never
/// subject to search list expansion.
pub(crate) fn qualify(name: &str) -> String {
    if name.ends_with('.') {
        name.into()
    } else {
        format!("{name}.")
    }
}

/// Returns the reverse lookup name for an address.
///
/// IPv4 addresses map to `in-addr.arpa.` and IPv6 addresses to the nibble
/// form under `ip6.arpa.` The name is absolute.
pub fn reverse_name(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(addr) => {
            let octets = addr.octets();
            format!(
                "{}.{}.{}.{}.in-addr.arpa.",
                octets[3], octets[2], octets[1], octets[0]
            )
        }
        IpAddr::V6(addr) => {
            let mut res = String::with_capacity(73);
            for &item in addr.octets().iter().rev() {
                // Writing to a string never fails.
                let _ = write!(res, "{:x}.{:x}.", item & 0x0F, item >> 4);
            }
            res.push_str("ip6.arpa.");
            res
        }
    }
}

//============ Tests =========================================================

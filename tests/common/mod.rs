//! Helpers shared by the integration tests.
#![allow(dead_code)]

use domain_mux::{Completion, Interest, QueryError, Rtype, Transport};
use std::collections::{HashMap, HashSet};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixDatagram;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Sets up logging of events reported by the engine and the tests.
///
/// Use the RUST_LOG environment variable to override the defaults.
///
/// E.g. to enable debug level logging:
///   RUST_LOG=DEBUG
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

//------------ Loopback ------------------------------------------------------

/// A transport answering from a canned zone through a socket pair.
///
/// Submitting a query writes its answer into one end of a datagram socket
/// pair. The answer becomes readable at the other end, which is what the
/// transport waits on. This way the event loops see real readiness.
pub struct Loopback {
    /// The end the transport reads answers from.
    sock: UnixDatagram,

    /// The end answers are written to.
    peer: UnixDatagram,

    /// The canned answers by query name and type.
    zone: HashMap<(String, Rtype), Result<Vec<String>, QueryError>>,

    /// Names that are never answered.
    silent: HashSet<String>,

    /// The outstanding queries by ID.
    pending: HashMap<u32, Completion>,

    /// The ID for the next query.
    next_id: u32,

    /// Every query submitted so far.
    submitted: Vec<(String, Rtype)>,

    /// Fail every drive.
    broken: bool,
}

impl Loopback {
    pub fn new() -> Self {
        let (sock, peer) = UnixDatagram::pair().unwrap();
        sock.set_nonblocking(true).unwrap();
        Loopback {
            sock,
            peer,
            zone: HashMap::new(),
            silent: HashSet::new(),
            pending: HashMap::new(),
            next_id: 0,
            submitted: Vec::new(),
            broken: false,
        }
    }

    /// A zone with the well-known test data.
    pub fn heise() -> Self {
        Self::new()
            .answer("heise.de.", Rtype::A, &["193.99.144.80"])
            .answer("heise.de.", Rtype::AAAA, &["2a02:2e0:3fe:1001:302::"])
            .answer(
                "heise.de.",
                Rtype::NS,
                &["ns.heise.de", "ns.s.plusline.de"],
            )
            .answer(
                "8.8.8.8.in-addr.arpa.",
                Rtype::PTR,
                &["google-public-dns-a.google.com"],
            )
    }

    pub fn answer(
        mut self,
        qname: &str,
        rtype: Rtype,
        records: &[&str],
    ) -> Self {
        self.zone.insert(
            (qname.into(), rtype),
            Ok(records.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    pub fn fail(
        mut self,
        qname: &str,
        rtype: Rtype,
        err: QueryError,
    ) -> Self {
        self.zone.insert((qname.into(), rtype), Err(err));
        self
    }

    pub fn silent(mut self, qname: &str) -> Self {
        self.silent.insert(qname.into());
        self
    }

    pub fn set_broken(&mut self, broken: bool) {
        self.broken = broken
    }

    pub fn submitted(&self) -> &[(String, Rtype)] {
        &self.submitted
    }

    pub fn fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    /// Encodes an answer datagram.
    fn encode(id: u32, outcome: &Result<Vec<String>, QueryError>) -> String {
        match outcome {
            Ok(records) => format!("{id} ok {}", records.join(" ")),
            Err(err) => format!("{id} err {}", err.to_int()),
        }
    }

    /// Decodes an answer datagram.
    fn decode(dgram: &str) -> Option<(u32, Result<Vec<String>, QueryError>)> {
        let mut words = dgram.split_whitespace();
        let id = words.next()?.parse().ok()?;
        match words.next()? {
            "ok" => Some((id, Ok(words.map(Into::into).collect()))),
            "err" => Some((
                id,
                Err(QueryError::from_int(words.next()?.parse().ok()?)),
            )),
            _ => None,
        }
    }
}

impl Transport for Loopback {
    fn submit(
        &mut self,
        qname: &str,
        rtype: Rtype,
        completion: Completion,
    ) -> Result<(), io::Error> {
        let id = self.next_id;
        self.next_id += 1;
        self.submitted.push((qname.into(), rtype));
        if !self.silent.contains(qname) {
            let outcome = self
                .zone
                .get(&(qname.to_string(), rtype))
                .cloned()
                .unwrap_or(Err(QueryError::NOTFOUND));
            self.peer.send(Self::encode(id, &outcome).as_bytes())?;
        }
        self.pending.insert(id, completion);
        Ok(())
    }

    fn interest(&self) -> Interest {
        if self.pending.is_empty() {
            Interest::new()
        } else {
            Interest {
                read: vec![self.fd()],
                write: Vec::new(),
            }
        }
    }

    fn next_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(5))
    }

    fn drive(
        &mut self,
        read: Option<RawFd>,
        _write: Option<RawFd>,
    ) -> Result<(), io::Error> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::Other, "broken"));
        }
        if read != Some(self.fd()) {
            return Ok(());
        }
        let mut buf = [0u8; 1024];
        loop {
            let len = match self.sock.recv(&mut buf) {
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(())
                }
                Err(err) => return Err(err),
            };
            let dgram = String::from_utf8_lossy(&buf[..len]);
            let Some((id, outcome)) = Self::decode(&dgram) else {
                continue;
            };
            if let Some(completion) = self.pending.remove(&id) {
                completion.complete(outcome)
            }
        }
    }
}

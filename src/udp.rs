//! A non-blocking DNS over UDP transport.
//!
//! [`UdpTransport`] sends each query as a single datagram to one of the
//! configured servers and waits for the answer. If no answer arrives within
//! the server’s request timeout, the query is sent to the next server until
//! the configured number of attempts is used up.
//!
//! There is one connected socket per server. It is opened when the first
//! query goes to that server and stays open for the lifetime of the
//! transport. Answers are matched to queries via message ID and question.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

// To do:
// - retry over TCP on truncated answers

use crate::conf::ResolvConf;
use crate::iana::Rtype;
use crate::status::QueryError;
use crate::transport::{Completion, Interest, Transport};
use domain::base::iana::Rtype as WireRtype;
use domain::base::{Message, MessageBuilder, Name, ParsedName};
use domain::rdata::AllRecordData;
use rand::random;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::os::unix::io::{AsRawFd, RawFd};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

//------------ UdpTransport --------------------------------------------------

/// A transport sending queries over UDP.
pub struct UdpTransport {
    /// The resolver configuration.
    conf: ResolvConf,

    /// The sockets, one per server.
    sockets: Vec<Option<UdpSocket>>,

    /// The outstanding queries by message ID.
    queries: HashMap<u16, Query>,

    /// The server to start the next query with if rotating.
    next_server: usize,
}

/// An outstanding query.
struct Query {
    /// The request message.
    request: Message<Vec<u8>>,

    /// The index of the server the request was last sent to.
    server: usize,

    /// The number of times the request has been sent.
    tries: usize,

    /// When the current try runs out.
    deadline: Instant,

    /// The record type asked for.
    rtype: Rtype,

    /// Where the outcome goes.
    completion: Completion,
}

impl UdpTransport {
    /// Creates a transport using the given configuration.
    ///
    /// The configuration is finalized first, so the transport always has
    /// at least one server.
    pub fn new(mut conf: ResolvConf) -> Self {
        conf.finalize();
        let sockets = conf.servers.iter().map(|_| None).collect();
        UdpTransport {
            conf,
            sockets,
            queries: HashMap::new(),
            next_server: 0,
        }
    }

    /// Creates a transport using the system configuration.
    pub fn system() -> Self {
        Self::new(ResolvConf::system())
    }

    /// Returns the configuration of the transport.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Returns the number of outstanding queries.
    pub fn outstanding(&self) -> usize {
        self.queries.len()
    }

    /// Returns a message ID not currently in use.
    ///
    /// Fails if every ID is taken by an outstanding query.
    fn fresh_id(&self) -> Result<u16, io::Error> {
        if self.queries.len() > usize::from(u16::MAX) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "all message IDs in use",
            ));
        }
        loop {
            let id = random();
            if !self.queries.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    /// Returns the server a new query starts with.
    fn first_server(&mut self) -> usize {
        if !self.conf.options.rotate {
            return 0;
        }
        let res = self.next_server;
        self.next_server = (res + 1) % self.conf.servers.len();
        res
    }

    /// Returns the socket for a server, opening it if necessary.
    fn socket(&mut self, server: usize) -> Result<&UdpSocket, io::Error> {
        let sock = match self.sockets[server].take() {
            Some(sock) => sock,
            None => open_socket(self.conf.servers[server].addr)?,
        };
        Ok(self.sockets[server].insert(sock))
    }

    /// Sends a query to its current server.
    ///
    /// This counts as a try and starts its timer even if sending fails.
    fn send(&mut self, query: &mut Query) -> Result<(), io::Error> {
        let server = &self.conf.servers[query.server];
        let addr = server.addr;
        query.tries += 1;
        query.deadline = Instant::now()
            + server.request_timeout.unwrap_or(self.conf.options.timeout);
        trace!("sending try {} to {addr}", query.tries);
        let sock = self.socket(query.server)?;
        sock.send(query.request.as_slice())?;
        Ok(())
    }

    /// Moves a query on to the next server or fails it.
    ///
    /// If all tries are used up, the query is completed with `err`.
    fn retry(&mut self, id: u16, mut query: Query, err: QueryError) {
        if query.tries >= self.conf.options.attempts {
            debug!("query {id}: giving up after {} tries", query.tries);
            query.completion.fail(err);
            return;
        }
        query.server = (query.server + 1) % self.conf.servers.len();
        if let Err(err) = self.send(&mut query) {
            warn!(
                "query {id}: sending to {} failed: {err}",
                self.conf.servers[query.server].addr
            );
        }
        self.queries.insert(id, query);
    }

    /// Receives everything available from a server’s socket.
    fn receive(&mut self, server: usize) {
        let mut buf = vec![0; self.conf.servers[server].recv_size];
        loop {
            let Some(sock) = self.sockets[server].as_ref() else {
                return;
            };
            match sock.recv(&mut buf) {
                Ok(len) => self.answer(server, &buf[..len]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    warn!(
                        "receiving from {} failed: {err}",
                        self.conf.servers[server].addr
                    );
                    self.server_failed(server);
                    return;
                }
            }
        }
    }

    /// Processes a datagram received from a server.
    fn answer(&mut self, server: usize, dgram: &[u8]) {
        let Ok(reply) = Message::from_octets(dgram) else {
            debug!("ignoring short datagram");
            return;
        };
        let id = reply.header().id();
        let matches = match self.queries.get(&id) {
            Some(query) => {
                query.server == server && reply.is_answer(&query.request)
            }
            None => false,
        };
        if !matches {
            debug!("ignoring unexpected response with ID {id}");
            return;
        }
        if let Some(query) = self.queries.remove(&id) {
            let outcome = outcome(&reply, query.rtype);
            trace!("query {id}: {outcome:?}");
            query.completion.complete(outcome);
        }
    }

    /// Moves all queries off a server that reported an error.
    fn server_failed(&mut self, server: usize) {
        let ids: Vec<u16> = self
            .queries
            .iter()
            .filter(|(_, query)| query.server == server)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(query) = self.queries.remove(&id) {
                self.retry(id, query, QueryError::CONNREFUSED);
            }
        }
    }

    /// Resends or fails all queries whose current try has run out.
    fn expire(&mut self, now: Instant) {
        let ids: Vec<u16> = self
            .queries
            .iter()
            .filter(|(_, query)| query.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            if let Some(query) = self.queries.remove(&id) {
                self.retry(id, query, QueryError::TIMEOUT);
            }
        }
    }

    /// Returns the server whose socket has the given descriptor.
    fn server_by_fd(&self, fd: RawFd) -> Option<usize> {
        self.sockets.iter().position(|sock| {
            sock.as_ref()
                .map(|sock| sock.as_raw_fd() == fd)
                .unwrap_or(false)
        })
    }
}

impl Transport for UdpTransport {
    fn submit(
        &mut self,
        qname: &str,
        rtype: Rtype,
        completion: Completion,
    ) -> Result<(), io::Error> {
        let id = self.fresh_id()?;
        let request = request(id, qname, rtype, self.conf.options.recurse)?;
        let mut query = Query {
            request,
            server: self.first_server(),
            tries: 0,
            deadline: Instant::now(),
            rtype,
            completion,
        };
        self.send(&mut query)?;
        self.queries.insert(id, query);
        Ok(())
    }

    fn interest(&self) -> Interest {
        let servers: BTreeSet<_> =
            self.queries.values().map(|query| query.server).collect();
        Interest {
            read: servers
                .into_iter()
                .filter_map(|server| self.sockets[server].as_ref())
                .map(AsRawFd::as_raw_fd)
                .collect(),
            write: Vec::new(),
        }
    }

    fn next_timeout(&self) -> Option<Duration> {
        let now = Instant::now();
        self.queries
            .values()
            .map(|query| query.deadline.saturating_duration_since(now))
            .min()
    }

    fn drive(
        &mut self,
        read: Option<RawFd>,
        _write: Option<RawFd>,
    ) -> Result<(), io::Error> {
        if let Some(fd) = read {
            match self.server_by_fd(fd) {
                Some(server) => self.receive(server),
                None => debug!("driven for unknown descriptor {fd}"),
            }
        }
        self.expire(Instant::now());
        Ok(())
    }
}

//------------ Helper Functions ----------------------------------------------

/// Opens a non-blocking socket connected to a server.
fn open_socket(addr: SocketAddr) -> Result<UdpSocket, io::Error> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let sock = UdpSocket::bind(local)?;
    sock.connect(addr)?;
    sock.set_nonblocking(true)?;
    debug!("opened socket {} for {addr}", sock.as_raw_fd());
    Ok(sock)
}

/// Creates the request message for a query.
fn request(
    id: u16,
    qname: &str,
    rtype: Rtype,
    recurse: bool,
) -> Result<Message<Vec<u8>>, io::Error> {
    let name = Name::<Vec<u8>>::from_str(qname).map_err(|err| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{qname}: {err}"))
    })?;
    let mut msg = MessageBuilder::new_vec();
    msg.header_mut().set_id(id);
    msg.header_mut().set_rd(recurse);
    let mut msg = msg.question();
    msg.push((name, WireRtype::from_int(rtype.to_int())))
        .map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "request too large")
        })?;
    Ok(msg.into_message())
}

/// Converts a reply into the outcome of a query.
fn outcome(
    reply: &Message<&[u8]>,
    rtype: Rtype,
) -> Result<Vec<String>, QueryError> {
    match reply.header().rcode().to_int() {
        0 => records(reply, rtype),
        1 => Err(QueryError::FORMERR),
        2 => Err(QueryError::SERVFAIL),
        3 => Err(QueryError::NOTFOUND),
        4 => Err(QueryError::NOTIMP),
        5 => Err(QueryError::REFUSED),
        _ => Err(QueryError::BADRESP),
    }
}

/// Extracts the answer records of the queried type.
///
/// Names are given without their trailing dot.
fn records(
    reply: &Message<&[u8]>,
    rtype: Rtype,
) -> Result<Vec<String>, QueryError> {
    let answer = reply.answer().map_err(|_| QueryError::BADRESP)?;
    let mut res = Vec::new();
    for record in answer.limit_to::<AllRecordData<&[u8], ParsedName<&[u8]>>>()
    {
        let record = record.map_err(|_| QueryError::BADRESP)?;
        if record.rtype().to_int() != rtype.to_int() {
            continue;
        }
        res.push(record.data().to_string().trim_end_matches('.').into());
    }
    if res.is_empty() {
        Err(QueryError::NODATA)
    } else {
        Ok(res)
    }
}

//============ Tests =========================================================

//! Resolver configuration
//!
//! The configuration here tells a transport which upstream servers to send
//! queries to and how patiently to wait for them. It is normally read from
//! the system’s `/etc/resolv.conf` and modeled along the lines of glibc’s
//! resolver. Only the parts that matter to a transport handing queries to
//! a recursive server are kept: servers, the timeout, the number of
//! attempts, and server rotation.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::{self, SplitWhitespace};
use std::time::Duration;
use std::{error, fmt, fs, io};

//------------ Module Configuration ------------------------------------------

/// The default timeout for a single try.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// The default number of tries per query.
const DEFAULT_ATTEMPTS: usize = 4;

/// The default port for DNS servers.
const DNS_PORT: u16 = 53;

//------------ ResolvOptions -------------------------------------------------

/// Options for the resolver configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvOptions {
    /// Timeout to wait for a response to a single try.
    pub timeout: Duration,

    /// Number of tries before giving up.
    pub attempts: usize,

    /// Use round-robin selection of name servers.
    pub rotate: bool,

    /// Set the recursion desired bit in queries.
    ///
    /// Enabled by default.
    pub recurse: bool,
}

impl Default for ResolvOptions {
    fn default() -> Self {
        ResolvOptions {
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            rotate: false,
            recurse: true,
        }
    }
}

//------------ ServerConf ----------------------------------------------------

/// Configuration for one upstream DNS server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConf {
    /// Server address.
    pub addr: SocketAddr,

    /// How long to wait for a response to one try.
    ///
    /// If this is `None`, the timeout from the options is used.
    pub request_timeout: Option<Duration>,

    /// Size of the message receive buffer in bytes.
    pub recv_size: usize,
}

impl ServerConf {
    /// Returns a new default server config for the given address.
    pub fn new(addr: SocketAddr) -> Self {
        ServerConf {
            addr,
            request_timeout: None,
            // Maximum non-fragmenting payload sizes from RFC 6891, 6.2.3.
            recv_size: match addr {
                SocketAddr::V4(_) => 1280,
                SocketAddr::V6(_) => 1410,
            },
        }
    }
}

//------------ ResolvConf ----------------------------------------------------

/// Resolver configuration.
///
/// After creating a value with `ResolvConf::new()` you can manipulate the
/// members. Once you are happy with them, you call `finalize()` to make
/// sure the configuration is valid.
///
/// Additionally, the type can parse a glibc-style configuration file,
/// commonly known as `/etc/resolv.conf` through the `parse()` and
/// `parse_file()` methods. You still need to call `finalize()` after
/// parsing.
///
/// The easiest way to get the system resolver configuration is through
/// `ResolvConf::system()`. This will parse the configuration file or fall
/// back to a default configuration if that fails.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResolvConf {
    /// Addresses of servers to query.
    pub servers: Vec<ServerConf>,

    /// Default options.
    pub options: ResolvOptions,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new, empty configuration.
    ///
    /// An empty configuration does not contain any name servers. Call
    /// `self.finalize()` to make it usable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, adds `127.0.0.1:53`. This is exactly what
    /// glibc does. Servers without a timeout of their own get the one from
    /// the options and a zero attempts count is raised to one.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            let addr = SocketAddr::new(
                IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
                DNS_PORT,
            );
            self.servers.push(ServerConf::new(addr));
        }
        if self.options.attempts == 0 {
            self.options.attempts = 1
        }
        for server in &mut self.servers {
            server.request_timeout.get_or_insert(self.options.timeout);
        }
    }

    /// Creates the configuration for this system.
    ///
    /// This currently only works for Unix-y systems. Elsewhere, and when
    /// the file cannot be read or parsed, the default configuration is
    /// used.
    pub fn system() -> Self {
        let mut res = ResolvConf::new();
        if let Err(err) = res.parse_file("/etc/resolv.conf") {
            tracing::debug!("ignoring /etc/resolv.conf: {err}");
            res = ResolvConf::new();
        }
        res.finalize();
        res
    }
}

/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        use std::io::BufRead;

        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                // Relative names are never expanded.
                Some("domain") | Some("search") | Some("sortlist") => {}
                Some("options") => self.parse_options(words)?,
                _ => return Err(Error::ParseError),
            }
        }
        Ok(())
    }

    fn parse_nameserver(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        let addr = next_word(&mut words)?;
        // Strip a scope ID. We cannot use it with a plain SocketAddr.
        let addr = addr.split('%').next().unwrap_or(addr);
        let addr = addr.parse::<IpAddr>().map_err(|_| Error::ParseError)?;
        self.servers.push(ServerConf::new(SocketAddr::new(addr, DNS_PORT)));
        no_more_words(words)
    }

    fn parse_options(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        for word in words {
            match split_arg(word)? {
                ("timeout", Some(n)) => {
                    self.options.timeout = Duration::from_secs(n as u64)
                }
                ("attempts", Some(n)) => self.options.attempts = n,
                ("rotate", None) => self.options.rotate = true,
                ("no-recurse", None) => self.options.recurse = false,
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
        Ok(())
    }
}

//--- Display

impl fmt::Display for ResolvConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for server in &self.servers {
            let server = server.addr;
            f.write_str("nameserver ")?;
            if server.port() == DNS_PORT {
                writeln!(f, "{}", server.ip())?;
            } else {
                writeln!(f, "{server}")?;
            }
        }
        // Collect options so we only print them if there are any non-default
        // ones.
        let mut options = Vec::new();

        if self.options.timeout != DEFAULT_TIMEOUT {
            // This ignores fractional seconds.
            options.push(format!(
                "timeout:{}",
                self.options.timeout.as_secs()
            ));
        }
        if self.options.attempts != DEFAULT_ATTEMPTS {
            options.push(format!("attempts:{}", self.options.attempts));
        }
        if self.options.rotate {
            options.push("rotate".into())
        }
        if !self.options.recurse {
            options.push("no-recurse".into())
        }

        if !options.is_empty() {
            writeln!(f, "options {}", options.join(" "))?;
        }

        Ok(())
    }
}

//------------ Private Helpers -----------------------------------------------
//
// These are here to wrap stuff into Results.

/// Returns a reference to the next word or an error.
fn next_word<'a>(words: &mut SplitWhitespace<'a>) -> Result<&'a str, Error> {
    words.next().ok_or(Error::ParseError)
}

/// Returns nothing but errors out if there are words left.
fn no_more_words(mut words: SplitWhitespace<'_>) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::ParseError),
        None => Ok(()),
    }
}

/// Splits the name and argument from an option with arguments.
///
/// These options consist of a name followed by a colon followed by a
/// value, which so far is only `usize`, so we do that.
fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.split_once(':') {
        Some((left, right)) => Ok((
            left,
            Some(right.parse::<usize>().map_err(|_| Error::ParseError)?),
        )),
        None => Ok((s, None)),
    }
}

//------------ Error ---------------------------------------------------------

/// The error that can happen when parsing `resolv.conf`.
#[derive(Debug)]
pub enum Error {
    /// The file is not a proper file.
    ParseError,

    /// Something happend while reading.
    Io(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ParseError => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ParseError => f.write_str("error parsing configuration"),
            Error::Io(err) => err.fmt(f),
        }
    }
}

//============ Testing =======================================================

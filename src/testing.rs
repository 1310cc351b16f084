//! A scripted in-memory transport for unit tests.

use crate::iana::Rtype;
use crate::status::QueryError;
use crate::transport::{Completion, Interest, Transport};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// The descriptor the scripted transport pretends to wait on.
pub(crate) const SCRIPTED_FD: RawFd = 1000;

/// A transport answering queries from a script when driven.
///
/// Queries without a scripted answer stay outstanding.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    /// The answers by query name and type.
    script: HashMap<(String, Rtype), Result<Vec<String>, QueryError>>,

    /// Every query submitted so far.
    submitted: Vec<(String, Rtype)>,

    /// The queries not yet answered.
    outstanding: Vec<(String, Rtype, Completion)>,

    /// Refuse submissions.
    refuse: bool,

    /// Fail the next drive after answering.
    break_drive: bool,

    /// Report no descriptors even with queries outstanding.
    idle: bool,

    /// The arguments of every drive so far.
    drives: Vec<(Option<RawFd>, Option<RawFd>)>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful answer.
    pub fn answer(
        mut self,
        qname: &str,
        rtype: Rtype,
        records: &[&str],
    ) -> Self {
        self.script.insert(
            (qname.into(), rtype),
            Ok(records.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    /// Scripts a failure.
    pub fn fail(
        mut self,
        qname: &str,
        rtype: Rtype,
        err: QueryError,
    ) -> Self {
        self.script.insert((qname.into(), rtype), Err(err));
        self
    }

    pub fn set_refuse(&mut self, refuse: bool) {
        self.refuse = refuse
    }

    pub fn set_break_drive(&mut self, value: bool) {
        self.break_drive = value
    }

    pub fn set_idle(&mut self, value: bool) {
        self.idle = value
    }

    pub fn drives(&self) -> &[(Option<RawFd>, Option<RawFd>)] {
        &self.drives
    }

    pub fn submitted(&self) -> &[(String, Rtype)] {
        &self.submitted
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }
}

impl Transport for ScriptedTransport {
    fn submit(
        &mut self,
        qname: &str,
        rtype: Rtype,
        completion: Completion,
    ) -> Result<(), io::Error> {
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::Other, "refused"));
        }
        self.submitted.push((qname.into(), rtype));
        self.outstanding.push((qname.into(), rtype, completion));
        Ok(())
    }

    fn interest(&self) -> Interest {
        if self.idle || self.outstanding.is_empty() {
            Interest::new()
        } else {
            Interest {
                read: vec![SCRIPTED_FD],
                write: Vec::new(),
            }
        }
    }

    fn next_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(1))
    }

    fn drive(
        &mut self,
        read: Option<RawFd>,
        write: Option<RawFd>,
    ) -> Result<(), io::Error> {
        self.drives.push((read, write));
        let mut remaining = Vec::new();
        for (qname, rtype, completion) in self.outstanding.drain(..) {
            match self.script.get(&(qname.clone(), rtype)) {
                Some(outcome) => completion.complete(outcome.clone()),
                None => remaining.push((qname, rtype, completion)),
            }
        }
        self.outstanding = remaining;
        if self.break_drive {
            return Err(io::Error::new(io::ErrorKind::Other, "broken"));
        }
        Ok(())
    }
}

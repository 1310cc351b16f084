//! Per-query failure codes.
//!
//! A transport reports the outcome of every query it was handed. When that
//! outcome is a failure, it is one of the codes defined here. The codes use
//! the numbering of the c-ares family of stub resolvers so that transports
//! built atop such a library can hand them through unchanged. The engine
//! itself never interprets them beyond collecting the distinct values.

//------------ QueryError ----------------------------------------------------

int_enum! {
    /// The reason a single query failed.
    ///
    /// Values without a constant are surfaced verbatim; they display as
    /// `E<n>`.
    =>
    QueryError, u16;

    /// The response contained no answers of the requested type.
    (NODATA => 1, "ENODATA")

    /// The server could not interpret the query.
    (FORMERR => 2, "EFORMERR")

    /// The server failed to process the query.
    (SERVFAIL => 3, "ESERVFAIL")

    /// The queried name does not exist.
    (NOTFOUND => 4, "ENOTFOUND")

    /// The server does not implement the requested operation.
    (NOTIMP => 5, "ENOTIMP")

    /// The server refused the query.
    (REFUSED => 6, "EREFUSED")

    /// The query could not be constructed.
    (BADQUERY => 7, "EBADQUERY")

    /// The query name is malformed.
    (BADNAME => 8, "EBADNAME")

    /// Unsupported address family.
    (BADFAMILY => 9, "EBADFAMILY")

    /// The response was malformed.
    (BADRESP => 10, "EBADRESP")

    /// The server could not be contacted.
    (CONNREFUSED => 11, "ECONNREFUSED")

    /// No response arrived before all tries were used up.
    (TIMEOUT => 12, "ETIMEOUT")

    /// End of file.
    (EOF => 13, "EOF")

    /// A file could not be read.
    (FILE => 14, "EFILE")

    /// Out of memory.
    (NOMEM => 15, "ENOMEM")

    /// The transport was torn down while the query was outstanding.
    (DESTRUCTION => 16, "EDESTRUCTION")

    /// A string was malformed.
    (BADSTR => 17, "EBADSTR")

    /// The query was cancelled.
    (CANCELLED => 24, "ECANCELLED")
}

int_enum_str_with_prefix!(QueryError, "E", u16, "unknown query error");

impl QueryError {
    /// Returns a human readable description of the code.
    pub fn description(self) -> &'static str {
        match self {
            QueryError::NODATA => "no data of the requested type",
            QueryError::FORMERR => "server reported a format error",
            QueryError::SERVFAIL => "server failure",
            QueryError::NOTFOUND => "domain name not found",
            QueryError::NOTIMP => "not implemented by the server",
            QueryError::REFUSED => "query refused",
            QueryError::BADQUERY => "malformed query",
            QueryError::BADNAME => "malformed domain name",
            QueryError::BADFAMILY => "unsupported address family",
            QueryError::BADRESP => "malformed response",
            QueryError::CONNREFUSED => "could not contact the server",
            QueryError::TIMEOUT => "timeout while contacting the server",
            QueryError::EOF => "end of file",
            QueryError::FILE => "error reading a file",
            QueryError::NOMEM => "out of memory",
            QueryError::DESTRUCTION => "transport destroyed during query",
            QueryError::BADSTR => "malformed string",
            QueryError::CANCELLED => "query cancelled",
            _ => "unknown error",
        }
    }
}

impl std::error::Error for QueryError {}

//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn codes_match_resolver_numbering() {
        assert_eq!(QueryError::NODATA.to_int(), 1);
        assert_eq!(QueryError::TIMEOUT.to_int(), 12);
        assert_eq!(QueryError::BADSTR.to_int(), 17);
        assert_eq!(QueryError::CANCELLED.to_int(), 24);
    }

    #[test]
    fn display_and_parse() {
        assert_eq!(QueryError::NOTFOUND.to_string(), "ENOTFOUND");
        assert_eq!(QueryError::from_int(99).to_string(), "E99");
        assert_eq!(QueryError::from_str("etimeout"), Ok(QueryError::TIMEOUT));
        assert_eq!(QueryError::from_str("E99"), Ok(QueryError::from_int(99)));
        assert!(QueryError::from_str("nonsense").is_err());
    }

    #[test]
    fn unknown_codes_keep_their_value() {
        let err = QueryError::from(300u16);
        assert_eq!(u16::from(err), 300);
        assert_eq!(err.description(), "unknown error");
    }
}

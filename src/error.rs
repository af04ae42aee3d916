//! Error types.

use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible acmezone error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a lookup or modification names a domain that no
    /// configured zone covers.
    #[error("acmezone: DNS zone is unknown: \"{0}\"")]
    ZoneNotFound(String),

    /// Returned when a zone covers the queried name but defines no node for
    /// it (not even a wildcard).
    #[error("acmezone: node not found in DNS zone: \"{0}\"")]
    NodeNotFound(String),

    /// Returned by a [`Cache`][crate::autocert::Cache] when no certificate
    /// is stored under the requested server name.
    #[error("acmezone: no certificate cached for \"{0}\"")]
    CertCacheMiss(String),

    /// Returned during bring-up when the SOA `ns` field is set without a
    /// corresponding `mbox`.
    #[error("SOA NS field specified without mbox")]
    SoaWithoutMbox,

    /// Returned when a responsible-party email can't be encoded as an SOA
    /// mbox because the local part contains a dot.
    #[error("mbox email address has '.' before '@': {0}")]
    InvalidMboxEmail(String),

    /// Returned when the wall clock produces a zone serial outside the
    /// 32-bit range.
    #[error("zone serial number out of range: {0}")]
    SerialOutOfRange(i64),

    /// Returned when a blocking operation is abandoned because its
    /// cancellation token fired first.
    #[error("operation cancelled")]
    Cancelled,

    /// Returned when an ACME authorization has already been rejected by the
    /// server.
    #[error("invalid ACME authorization {0}")]
    InvalidAuthorization(String),

    /// Returned when an authorization offers a challenge of a type other
    /// than `dns-01`.
    #[error("unsupported challenge types")]
    UnsupportedChallenge,

    /// Returned when none of an authorization's challenge combinations
    /// could be fulfilled.
    #[error("no supported challenge combinations")]
    NoChallengeCombination,

    /// A remote ACME failure passed through from the client.
    #[error("ACME client error: {0}")]
    Acme(String),

    /// Returned when a generic IO error occurs.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Returned when the DNS server encounters a generic protocol error.
    #[error(transparent)]
    Proto(#[from] ProtoError),

    /// Returned when a configuration file contains invalid JSON.
    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that mean "the queried thing does not exist": an
    /// unknown zone, an unknown node within a known zone, or an empty
    /// certificate cache slot.
    pub fn is_not_exist(&self) -> bool {
        matches!(
            self,
            Error::ZoneNotFound(_) | Error::NodeNotFound(_) | Error::CertCacheMiss(_)
        )
    }
}

//! # acmezone
//!
//! Automatic ACME-based TLS certificate renewal via a built-in
//! authoritative DNS server. The point is wildcard certificates, which
//! require [RFC-8555] [DNS-01] verification: instead of driving a cloud DNS
//! provider API, the server publishes the challenge TXT records itself.
//!
//! The pieces compose into one process that is both the TLS server and the
//! primary name server for its own zones:
//!
//! - [`container::Container`] holds the zones in memory, serializes
//!   challenge writes against concurrent queries, and coalesces writes into
//!   monotone SOA serial advances.
//! - [`dns`] serves authoritative answers — and zone transfers for
//!   secondaries — for those zones over UDP and TCP.
//! - [`acme`] solves `dns-01` challenges by writing TXT records through the
//!   container and waiting for them to become visible.
//! - [`autocert`] gates certificate requests on the zone database and
//!   bridges a TLS listener's get-certificate hook to the driver.
//!
//! The subsystems also stand alone: the DNS server takes any
//! [`dns::Resolver`], and the ACME driver takes any [`acme::Dns`], e.g. if
//! the TLS listener and the name server must run in different processes.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod acme;
pub mod autocert;
pub mod config;
pub mod container;
pub mod dns;
pub mod error;
pub mod record;
pub mod zone;

pub use config::Config;
pub use container::{Container, Lookup};
pub use dns::{serve, ServerConfig, Soa};
pub use error::Error;
pub use record::{Node, RType, Record, RecordSet, APEX, WILDCARD};
pub use zone::Zone;

//! Authoritative DNS serving.
//!
//! The server answers class `IN` queries for the zones held by a
//! [`Resolver`] implementation — normally a
//! [`Container`][crate::container::Container] — over both UDP and TCP.
//! It is authoritative-only: no recursion, no caching, no DNSSEC.
//!
//! # Answers
//!
//! A, AAAA, NS, and TXT records come straight from the zone nodes, with
//! wildcard owner-name substitution for `*` nodes. When an
//! [`Soa`][soa::Soa] authority is configured, the apex additionally answers
//! SOA and NS questions, negative answers carry the SOA in the authority
//! section, and full zone transfers are served:
//!
//! ```bash
//! ❯ dig @192.0.2.0 example.org SOA +short
//! ns.example.net. hostmaster.example.net. 260000000 7200 900 1209600 3600
//! ❯ dig @192.0.2.0 example.org AXFR
//! ...
//! ```
//!
//! `IXFR` questions are accepted and answered like `AXFR`. Questions of any
//! other class than `IN` are refused with `NOTIMP`.
//!
//! # Dynamic TXT records
//!
//! The zone contents are whatever the resolver holds, so TXT records
//! installed through the container's modify path — e.g. `_acme-challenge`
//! values written by the [`acme`][crate::acme] driver — are served as soon
//! as they land, under the zone serial published at the end of the current
//! coalescing window.

pub mod handler;
pub mod server;
pub mod soa;

pub use server::{serve, ServerConfig};
pub use soa::{email_mbox, Soa};

use async_trait::async_trait;

use crate::container::{Container, Lookup};
use crate::record::Node;

/// Read access to zone data, as consumed by the server. Lookups happen per
/// query, so implementations should be quick.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve a hostname to a copy of its node. The returned variant
    /// distinguishes a resolved node, a known zone without the node, and a
    /// name outside every zone; serials are the owning zone's.
    async fn resolve_resource(&self, name: &str) -> Lookup;

    /// Copy the contents of a zone. The apex node must come first if
    /// present. The serial is non-zero if the zone was found, zero if not.
    async fn transfer_zone(&self, domain: &str) -> (Vec<Node>, u32);
}

#[async_trait]
impl Resolver for Container {
    async fn resolve_resource(&self, name: &str) -> Lookup {
        Container::resolve_resource(self, name).await
    }

    async fn transfer_zone(&self, domain: &str) -> (Vec<Node>, u32) {
        Container::transfer_zone(self, domain).await
    }
}

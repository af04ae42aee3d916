//! The record model shared by zones, the container, and the DNS server.
//!
//! Records are a closed set of four variants (A, AAAA, NS, TXT) — the types
//! a certificate-renewal name server actually needs to publish. A node's
//! records live in a [`RecordSet`], which holds at most one record per type.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::slice;

/// Node name identifying a zone's apex.
pub const APEX: &str = "@";

/// Node name matching any otherwise-undefined single-label child of the
/// apex.
pub const WILDCARD: &str = "*";

/// DNS record type codes. The values match the standard IANA assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RType {
    A = 1,
    Ns = 2,
    Txt = 16,
    Aaaa = 28,
}

/// A single record within a node's record set.
///
/// An empty record (absent address, empty hostname, no values) acts as a
/// removal marker: inserting it into a [`RecordSet`] deletes the same-type
/// record instead of storing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    A { addr: Option<Ipv4Addr>, ttl: u32 },
    Aaaa { addr: Option<Ipv6Addr>, ttl: u32 },
    Ns { host: String, ttl: u32 },
    Txt { values: Vec<String>, ttl: u32 },
}

impl Record {
    pub fn a(addr: Ipv4Addr, ttl: u32) -> Self {
        Record::A {
            addr: Some(addr),
            ttl,
        }
    }

    pub fn aaaa(addr: Ipv6Addr, ttl: u32) -> Self {
        Record::Aaaa {
            addr: Some(addr),
            ttl,
        }
    }

    pub fn ns(host: impl Into<String>, ttl: u32) -> Self {
        Record::Ns {
            host: host.into(),
            ttl,
        }
    }

    pub fn txt(values: Vec<String>, ttl: u32) -> Self {
        Record::Txt { values, ttl }
    }

    pub fn rtype(&self) -> RType {
        match self {
            Record::A { .. } => RType::A,
            Record::Aaaa { .. } => RType::Aaaa,
            Record::Ns { .. } => RType::Ns,
            Record::Txt { .. } => RType::Txt,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Record::A { addr, .. } => addr.is_none(),
            Record::Aaaa { addr, .. } => addr.is_none(),
            Record::Ns { host, .. } => host.is_empty(),
            Record::Txt { values, .. } => values.is_empty(),
        }
    }

    pub fn ttl(&self) -> u32 {
        match self {
            Record::A { ttl, .. }
            | Record::Aaaa { ttl, .. }
            | Record::Ns { ttl, .. }
            | Record::Txt { ttl, .. } => *ttl,
        }
    }
}

/// An unordered collection of records holding at most one record per type.
///
/// Cloning a record set clones the backing data of every record, so results
/// handed out by the container never alias zone state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        RecordSet::default()
    }

    /// Install a record, replacing any existing record of the same type.
    /// Inserting an empty record removes the same-type record instead.
    pub fn insert(&mut self, record: Record) {
        let rtype = record.rtype();
        if record.is_empty() {
            self.records.retain(|r| r.rtype() != rtype);
        } else if let Some(existing) = self.records.iter_mut().find(|r| r.rtype() == rtype) {
            *existing = record;
        } else {
            self.records.push(record);
        }
    }

    pub fn get(&self, rtype: RType) -> Option<&Record> {
        self.records.iter().find(|r| r.rtype() == rtype)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut set = RecordSet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A host within a zone. An empty name indicates a nonexistent node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub records: RecordSet,
}

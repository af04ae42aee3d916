//! A single DNS zone: one domain's node map.

use std::collections::HashMap;

use crate::dns::soa::dot_suffix;
use crate::record::{Node, Record, RecordSet, APEX, WILDCARD};

/// Enumerates the nodes of a domain.
///
/// Serial numbers are managed by the [`Container`][crate::container::Container]
/// that owns the zone; a zone on its own has no locking and no serial of its
/// own making.
#[derive(Debug, Clone)]
pub struct Zone {
    domain: String,
    nodes: HashMap<String, RecordSet>,
    pub(crate) serial: u32,
}

impl Zone {
    /// Create an empty zone. The domain is normalized to lowercase,
    /// dot-terminated form.
    pub fn new(domain: impl Into<String>) -> Self {
        Zone {
            domain: dot_suffix(&domain.into().to_ascii_lowercase()),
            nodes: HashMap::new(),
            serial: 0,
        }
    }

    /// Insert a record for the named node (`@` for the apex, `*` for the
    /// wildcard). Intended for initial population; once the zone is owned by
    /// a container, records change only through the container's modify path.
    pub fn insert(&mut self, node: &str, record: Record) {
        self.modify(node, record);
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Map a hostname to a node name within this zone: `@` for the domain
    /// itself, the bare label for a direct child. Names are expected to be
    /// normalized by the caller.
    pub(crate) fn match_resource(&self, name: &str) -> Option<String> {
        if name == self.domain {
            return Some(APEX.to_string());
        }
        if let Some(prefix) = name.strip_suffix(&self.domain) {
            if let Some(label) = prefix.strip_suffix('.') {
                if !label.is_empty() && !label.contains('.') {
                    return Some(label.to_string());
                }
            }
        }
        None
    }

    /// Look up a node's record set, falling back to the wildcard node. The
    /// wildcard never applies to the apex.
    pub(crate) fn resolve_node(&self, node: &str) -> Option<&RecordSet> {
        match self.nodes.get(node) {
            Some(records) => Some(records),
            None if node != APEX => self.nodes.get(WILDCARD),
            None => None,
        }
    }

    /// Copy the contents of the zone: the apex first if present, concrete
    /// nodes in unspecified order, and the wildcard last if present.
    pub(crate) fn transfer(&self) -> Vec<Node> {
        let mut results = Vec::with_capacity(self.nodes.len());

        if let Some(records) = self.nodes.get(APEX) {
            results.push(Node {
                name: APEX.to_string(),
                records: records.clone(),
            });
        }

        for (name, records) in &self.nodes {
            if name != APEX && name != WILDCARD {
                results.push(Node {
                    name: name.clone(),
                    records: records.clone(),
                });
            }
        }

        if let Some(records) = self.nodes.get(WILDCARD) {
            results.push(Node {
                name: WILDCARD.to_string(),
                records: records.clone(),
            });
        }

        results
    }

    /// Install, replace, or remove a record. A node whose record set
    /// becomes empty is dropped.
    pub(crate) fn modify(&mut self, node: &str, record: Record) {
        if record.is_empty() {
            if let Some(records) = self.nodes.get_mut(node) {
                records.insert(record);
                if records.is_empty() {
                    self.nodes.remove(node);
                }
            }
        } else {
            self.nodes
                .entry(node.to_string())
                .or_default()
                .insert(record);
        }
    }
}

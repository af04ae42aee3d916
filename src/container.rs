//! The zone container.
//!
//! A [`Container`] coordinates concurrent DNS reads against ACME challenge
//! writes over a fixed set of zones. Reads share a lock; writes are
//! exclusive. Serial numbers advance at most once per one-second coalescing
//! window: the record content of a write is visible immediately, while its
//! serial advance is batched with every other write landing in the same
//! window and applied in one step. Secondaries polling via SOA/AXFR thus see
//! at most one zone delta per second, while writers still get a usable
//! post-condition ("my update is visible") by blocking on the window signal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::record::{Node, Record};
use crate::zone::Zone;

/// Unix time subtracted from the wall clock to form initial zone serials.
pub const SERIAL_EPOCH: i64 = 1_500_000_000;

/// How long serial number changes batch before being applied.
const COALESCE_WINDOW: Duration = Duration::from_secs(1);

/// Outcome of resolving a hostname against the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The name resolved to a node in a known zone. The records are copies;
    /// mutating them does not touch zone state.
    Records { node: Node, serial: u32 },

    /// A zone covers the name, but no node (not even the wildcard) serves
    /// it. The serial is the covering zone's, for use in negative answers.
    NameError { serial: u32 },

    /// No configured zone covers the name.
    OutOfZone,
}

/// Container of zones. Zones are fixed at construction; records within them
/// change only through the modify path.
#[derive(Clone)]
pub struct Container {
    shared: Arc<Shared>,
}

struct Shared {
    state: RwLock<State>,
}

struct State {
    zones: Vec<Zone>,
    window: Option<Window>,
}

/// Coalescing state for the in-progress window. Present only between the
/// first write of a window and the apply task firing.
struct Window {
    ready_tx: watch::Sender<bool>,
    ready_rx: watch::Receiver<bool>,
    domains: HashSet<String>,
}

impl Container {
    /// Create a container with a wall-clock-derived initial serial shared by
    /// all zones.
    pub fn new(zones: Vec<Zone>) -> Result<Self, Error> {
        Ok(Self::with_serial(
            time_serial(OffsetDateTime::now_utc())?,
            zones,
        ))
    }

    /// Create a container with a custom initial serial.
    pub fn with_serial(serial: u32, mut zones: Vec<Zone>) -> Self {
        for zone in &mut zones {
            zone.serial = serial;
        }
        Container {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    zones,
                    window: None,
                }),
            }),
        }
    }

    /// Resolve a hostname to the node serving it. The first zone whose
    /// domain covers the name wins. The caller is expected to pass a
    /// normalized (lowercase, dot-terminated) name.
    pub async fn resolve_resource(&self, name: &str) -> Lookup {
        let state = self.shared.state.read().await;
        for zone in &state.zones {
            if let Some(node) = zone.match_resource(name) {
                return match zone.resolve_node(&node) {
                    Some(records) => Lookup::Records {
                        node: Node {
                            name: node,
                            records: records.clone(),
                        },
                        serial: zone.serial,
                    },
                    None => Lookup::NameError {
                        serial: zone.serial,
                    },
                };
            }
        }
        Lookup::OutOfZone
    }

    /// Check the existence of a host. If it is a known node in a known
    /// zone, the zone's domain is returned; otherwise the error's
    /// [`is_not_exist`][Error::is_not_exist] is true.
    pub async fn resolve_zone(&self, hostname: &str) -> Result<String, Error> {
        let state = self.shared.state.read().await;
        let mut zone_found = false;

        for zone in &state.zones {
            if let Some(node) = zone.match_resource(hostname) {
                zone_found = true;
                if zone.resolve_node(&node).is_some() {
                    return Ok(zone.domain().to_string());
                }
            }
        }

        Err(if zone_found {
            Error::NodeNotFound(hostname.to_string())
        } else {
            Error::ZoneNotFound(hostname.to_string())
        })
    }

    /// Copy the contents of a zone, apex node first. A zero serial means
    /// the zone was not found.
    pub async fn transfer_zone(&self, domain: &str) -> (Vec<Node>, u32) {
        let state = self.shared.state.read().await;
        for zone in &state.zones {
            if zone.domain() == domain {
                return (zone.transfer(), zone.serial);
            }
        }
        (Vec::new(), 0)
    }

    /// Create, update, or remove a TXT record, blocking until the zone's
    /// serial advance is visible to readers or `cancel` fires.
    pub async fn modify_txt_record(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        node: &str,
        values: Vec<String>,
        ttl: u32,
    ) -> Result<(), Error> {
        self.modify_record(cancel, zone, node, Record::Txt { values, ttl })
            .await
    }

    /// Record-generic modify path. The record content lands immediately;
    /// the serial advance is coalesced with every other write in the same
    /// one-second window, and this call returns once that advance is
    /// visible.
    ///
    /// Cancellation while waiting returns [`Error::Cancelled`]. The record
    /// modification is not rolled back: it stays staged and the scheduled
    /// serial advance still fires at the end of the window.
    pub async fn modify_record(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        node: &str,
        record: Record,
    ) -> Result<(), Error> {
        let mut ready = {
            let mut state = self.shared.state.write().await;
            let Some(target) = state.zones.iter_mut().find(|z| z.domain() == zone) else {
                return Err(Error::ZoneNotFound(zone.to_string()));
            };

            // Modify the zone immediately without changing the serial; the
            // serial moves once per window so it never runs ahead of what
            // secondaries can observe.
            target.modify(node, record);
            self.schedule_change(&mut state, zone)
        };

        tokio::select! {
            () = cancel.cancelled() => Err(Error::Cancelled),
            _ = ready.changed() => Ok(()),
        }
    }

    /// Remove a TXT record at some point in the future. Returns without
    /// waiting for the serial advance; unknown zones are ignored.
    pub async fn forget_txt_record(&self, zone: &str, node: &str) -> Result<(), Error> {
        let mut state = self.shared.state.write().await;
        let Some(target) = state.zones.iter_mut().find(|z| z.domain() == zone) else {
            return Ok(());
        };

        target.modify(
            node,
            Record::Txt {
                values: Vec::new(),
                ttl: 0,
            },
        );
        self.schedule_change(&mut state, zone);
        Ok(())
    }

    /// Register a zone with the current coalescing window, allocating the
    /// window and its apply timer if none is in progress. Must be called
    /// with the write lock held.
    fn schedule_change(&self, state: &mut State, domain: &str) -> watch::Receiver<bool> {
        let window = state.window.get_or_insert_with(|| {
            let (ready_tx, ready_rx) = watch::channel(false);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                sleep(COALESCE_WINDOW).await;
                apply_changes(&shared).await;
            });
            Window {
                ready_tx,
                ready_rx,
                domains: HashSet::new(),
            }
        });
        window.domains.insert(domain.to_string());
        window.ready_rx.clone()
    }
}

/// Increment the serial of every zone registered with the window, exactly
/// once each, then wake all waiters and clear the window so the next write
/// starts a fresh one.
async fn apply_changes(shared: &Shared) {
    let mut state = shared.state.write().await;
    if let Some(window) = state.window.take() {
        for zone in &mut state.zones {
            if window.domains.contains(zone.domain()) {
                zone.serial = zone.serial.wrapping_add(1);
            }
        }
        debug!(zones = window.domains.len(), "applied coalesced serial changes");
        let _ = window.ready_tx.send(true);
    }
}

/// Time-based serial number with one-second granularity. Defined for times
/// between mid-2017 ([`SERIAL_EPOCH`]) and the 32-bit wrap-around in 2106;
/// earlier clocks clamp to 1, later ones are an error.
pub fn time_serial(t: OffsetDateTime) -> Result<u32, Error> {
    let n = t.unix_timestamp() - SERIAL_EPOCH;
    u32::try_from(n.max(1)).map_err(|_| Error::SerialOutOfRange(n))
}

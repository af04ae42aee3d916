//! Server configuration, loaded from a JSON file.
//!
//! ```json
//! {
//!   "listen_addr": "0.0.0.0:53",
//!   "soa": {
//!     "ns": "ns.example.net",
//!     "admin_email": "hostmaster@example.net"
//!   },
//!   "zones": {
//!     "example.org": {
//!       "*": { "a": "192.0.2.0", "ttl": 7200 }
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};

use crate::dns::soa::{dot_suffix, email_mbox, Soa};
use crate::error::Error;
use crate::record::Record;
use crate::zone::Zone;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Address both DNS listeners bind.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default)]
    pub no_tcp: bool,
    #[serde(default)]
    pub no_udp: bool,
    /// Idle timeout for accepted TCP connections, in seconds.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout: Duration,
    #[serde(default)]
    pub soa: SoaConfig,
    /// Zone contents: domain, then node name, then records.
    pub zones: HashMap<String, HashMap<String, NodeConfig>>,
}

/// Authority settings as written in the config file. Zero values disable
/// authority; unset timers fall back to the server defaults.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SoaConfig {
    #[serde(default)]
    pub ns: String,
    /// Responsible-party email, e.g. `hostmaster@example.net`.
    #[serde(default)]
    pub admin_email: String,
    #[serde(default)]
    pub refresh: u32,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub expire: u32,
    #[serde(default)]
    pub min_ttl: u32,
    #[serde(default)]
    pub ttl: u32,
}

/// Records served for one node.
#[derive(Deserialize, Debug, Clone)]
pub struct NodeConfig {
    pub a: Option<Ipv4Addr>,
    pub aaaa: Option<Ipv6Addr>,
    pub ns: Option<String>,
    pub txt: Option<Vec<String>>,
    #[serde(default = "default_record_ttl")]
    pub ttl: u32,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 53))
}

fn default_tcp_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_record_ttl() -> u32 {
    3600
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Build the zone set declared in the config.
    pub fn zones(&self) -> Vec<Zone> {
        let mut zones = Vec::with_capacity(self.zones.len());
        for (domain, nodes) in &self.zones {
            let mut zone = Zone::new(domain.clone());
            for (node, records) in nodes {
                if let Some(addr) = records.a {
                    zone.insert(node, Record::a(addr, records.ttl));
                }
                if let Some(addr) = records.aaaa {
                    zone.insert(node, Record::aaaa(addr, records.ttl));
                }
                if let Some(host) = &records.ns {
                    zone.insert(node, Record::ns(dot_suffix(host), records.ttl));
                }
                if let Some(values) = &records.txt {
                    zone.insert(node, Record::txt(values.clone(), records.ttl));
                }
            }
            zones.push(zone);
        }
        zones
    }

    /// SOA settings with the admin email converted to mbox form.
    pub fn soa(&self) -> Result<Soa, Error> {
        Ok(Soa {
            ns: dot_suffix(&self.soa.ns),
            mbox: email_mbox(&self.soa.admin_email)?,
            refresh: self.soa.refresh,
            retry: self.soa.retry,
            expire: self.soa.expire,
            min_ttl: self.soa.min_ttl,
            ttl: self.soa.ttl,
        })
    }
}

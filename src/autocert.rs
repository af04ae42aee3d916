//! Certificate retrieval bridge for TLS listeners.
//!
//! A TLS listener asks for a certificate by ClientHello server name. The
//! [`Manager`] gates the request on the zone database (names outside the
//! configured zones never reach the ACME account), serves cached
//! certificates, and otherwise proves control of the name with the
//! [`acme`][crate::acme] driver before asking the order machinery for a
//! fresh certificate.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::acme::{self, AcmeClient};
use crate::container::Container;
use crate::error::Error;

/// Zone-aware DNS capability: the narrow TXT capability plus host
/// existence checks.
#[async_trait]
pub trait Dns: acme::Dns {
    /// Check the existence of a host. If it is a known node in a known
    /// zone, the zone's domain name is returned. In all other cases the
    /// returned error's [`is_not_exist`][Error::is_not_exist] is true.
    async fn resolve_zone(&self, hostname: &str) -> Result<String, Error>;
}

#[async_trait]
impl Dns for Container {
    async fn resolve_zone(&self, hostname: &str) -> Result<String, Error> {
        Container::resolve_zone(self, hostname).await
    }
}

/// Certificate storage keyed by server name. The blobs are opaque to the
/// manager.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch a stored certificate. A missing entry yields an error whose
    /// [`is_not_exist`][Error::is_not_exist] is true.
    async fn get(&self, key: &str) -> Result<Vec<u8>, Error>;

    /// Store a certificate.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), Error>;
}

/// The order/renewal machinery that mints a certificate for a server name
/// whose authorization has already been verified.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn issue(&self, server_name: &str) -> Result<Vec<u8>, Error>;
}

/// Bridges "get certificate for this server name" to the zone database and
/// the dns-01 driver.
pub struct Manager<C> {
    client: Arc<C>,
    dns: Arc<dyn Dns>,
    cache: Arc<dyn Cache>,
    issuer: Arc<dyn Issuer>,
}

impl<C: AcmeClient> Manager<C> {
    pub fn new(
        client: Arc<C>,
        dns: Arc<dyn Dns>,
        cache: Arc<dyn Cache>,
        issuer: Arc<dyn Issuer>,
    ) -> Self {
        Manager {
            client,
            dns,
            cache,
            issuer,
        }
    }

    /// Host policy for incoming server names: only names resolving within a
    /// configured zone are eligible for certificates.
    pub async fn host_policy(&self, host: &str) -> Result<(), Error> {
        debug!(%host, "host policy check");
        match self.dns.resolve_zone(&format!("{host}.")).await {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(%host, "host policy rejected: {err}");
                Err(err)
            }
        }
    }

    /// Prove control of `server_name` by solving a dns-01 challenge in the
    /// zone that defines it.
    pub async fn verify(
        &self,
        cancel: &CancellationToken,
        server_name: &str,
    ) -> Result<(), Error> {
        let zone = self.dns.resolve_zone(&format!("{server_name}.")).await?;
        acme::verify(cancel, &*self.client, &*self.dns, server_name, &zone).await
    }

    /// Retrieve a certificate for a TLS ClientHello server name: reject
    /// names outside the zones, serve the cache when it has an entry, and
    /// otherwise verify the name and obtain a fresh certificate.
    pub async fn get_certificate(
        &self,
        cancel: &CancellationToken,
        server_name: &str,
    ) -> Result<Vec<u8>, Error> {
        self.host_policy(server_name).await?;

        match self.cache.get(server_name).await {
            Ok(cert) => return Ok(cert),
            Err(err) if err.is_not_exist() => {}
            Err(err) => return Err(err),
        }

        self.verify(cancel, server_name).await?;
        let cert = self.issuer.issue(server_name).await?;
        self.cache.put(server_name, &cert).await?;
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{Authorization, AuthzStatus, Challenge};
    use crate::record::{Record, WILDCARD};
    use crate::zone::Zone;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct ValidClient;

    #[async_trait]
    impl AcmeClient for ValidClient {
        async fn authorize(&self, _name: &str) -> Result<Authorization, Error> {
            Ok(Authorization {
                uri: "https://acme.example/authz/1".to_string(),
                status: AuthzStatus::Valid,
                challenges: vec![],
                combinations: vec![],
            })
        }

        async fn accept(&self, challenge: &Challenge) -> Result<Challenge, Error> {
            Ok(challenge.clone())
        }

        async fn wait_authorization(&self, _uri: &str) -> Result<Authorization, Error> {
            unreachable!("valid authorizations never wait")
        }

        fn dns01_challenge_record(&self, _token: &str) -> Result<String, Error> {
            unreachable!("valid authorizations need no record")
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl Cache for MemoryCache {
        async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
            self.entries
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| Error::CertCacheMiss(key.to_string()))
        }

        async fn put(&self, key: &str, data: &[u8]) -> Result<(), Error> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingIssuer {
        issued: Mutex<usize>,
    }

    #[async_trait]
    impl Issuer for CountingIssuer {
        async fn issue(&self, server_name: &str) -> Result<Vec<u8>, Error> {
            *self.issued.lock().unwrap() += 1;
            Ok(format!("cert-for-{server_name}").into_bytes())
        }
    }

    fn container() -> Container {
        let mut zone = Zone::new("example.org.");
        zone.insert(WILDCARD, Record::a("192.0.2.0".parse().unwrap(), 7200));
        Container::with_serial(100, vec![zone])
    }

    fn manager() -> (Manager<ValidClient>, Arc<CountingIssuer>) {
        let issuer = Arc::new(CountingIssuer::default());
        let manager = Manager::new(
            Arc::new(ValidClient),
            Arc::new(container()),
            Arc::new(MemoryCache::default()),
            issuer.clone(),
        );
        (manager, issuer)
    }

    #[tokio::test]
    async fn host_policy_gates_on_zones() {
        let (manager, _) = manager();
        manager.host_policy("www.example.org").await.unwrap();

        let err = manager.host_policy("www.example.net").await.unwrap_err();
        assert!(err.is_not_exist(), "{err}");
    }

    #[tokio::test]
    async fn get_certificate_issues_then_caches() {
        let (manager, issuer) = manager();
        let cancel = CancellationToken::new();

        let cert = manager
            .get_certificate(&cancel, "www.example.org")
            .await
            .unwrap();
        assert_eq!(cert, b"cert-for-www.example.org");
        assert_eq!(*issuer.issued.lock().unwrap(), 1);

        let again = manager
            .get_certificate(&cancel, "www.example.org")
            .await
            .unwrap();
        assert_eq!(again, cert);
        assert_eq!(*issuer.issued.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn get_certificate_rejects_unknown_hosts() {
        let (manager, issuer) = manager();
        let cancel = CancellationToken::new();

        let err = manager
            .get_certificate(&cancel, "www.example.net")
            .await
            .unwrap_err();
        assert!(err.is_not_exist(), "{err}");
        assert_eq!(*issuer.issued.lock().unwrap(), 0);
    }
}

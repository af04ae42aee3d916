//! ACME dns-01 challenge driver.
//!
//! Bridges the transactional ACME HTTP protocol to the eventually-visible
//! DNS updates published by the zone container: the driver selects a
//! `dns-01` challenge from an authorization, installs the proof TXT record
//! through a [`Dns`] capability (blocking until the zone serial advance is
//! visible), tells the ACME server to validate, waits for the authorization
//! to settle, and cleans the record up afterwards.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::container::Container;
use crate::error::Error;

const CHALLENGE_TYPE: &str = "dns-01";

/// Node under which challenge TXT records are installed.
pub const CHALLENGE_NODE: &str = "_acme-challenge";

/// TTL of the challenge TXT record, in seconds.
const CHALLENGE_TTL: u32 = 1;

/// Status of an ACME authorization resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// An ACME authorization for one identifier.
#[derive(Debug, Clone)]
pub struct Authorization {
    pub uri: String,
    pub status: AuthzStatus,
    pub challenges: Vec<Challenge>,
    /// Indexes into `challenges`; the challenges of one combination must be
    /// fulfilled together to satisfy the authorization. An empty list is
    /// treated as a single combination spanning every challenge.
    pub combinations: Vec<Vec<usize>>,
}

/// One challenge within an authorization.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub uri: String,
    /// Challenge type identifier, e.g. `dns-01`.
    pub kind: String,
    pub token: String,
}

/// The ACME client operations the driver needs. The client owns account
/// keys, request signing, and retry/backoff policy; cancellation propagates
/// by dropping the returned futures.
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Fetch or create the authorization for a domain name.
    async fn authorize(&self, name: &str) -> Result<Authorization, Error>;

    /// Notify the server that a challenge is ready to be validated.
    async fn accept(&self, challenge: &Challenge) -> Result<Challenge, Error>;

    /// Poll an authorization until it settles. Returns an error when the
    /// authorization ends up anything but valid.
    async fn wait_authorization(&self, uri: &str) -> Result<Authorization, Error>;

    /// Derive the TXT record value proving control of a challenge token.
    fn dns01_challenge_record(&self, token: &str) -> Result<String, Error>;
}

/// Write access to TXT records on the name server. It doesn't have to be
/// instantaneous.
#[async_trait]
pub trait Dns: Send + Sync {
    /// Create, update, or remove a TXT record. Blocks until the
    /// modification is visible or `cancel` fires.
    async fn modify_txt_record(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        node: &str,
        values: Vec<String>,
        ttl: u32,
    ) -> Result<(), Error>;

    /// Remove a TXT record at some point in the future, without waiting for
    /// the modification to complete. Unknown zones are not an error.
    async fn forget_txt_record(&self, zone: &str, node: &str) -> Result<(), Error>;
}

#[async_trait]
impl Dns for Container {
    async fn modify_txt_record(
        &self,
        cancel: &CancellationToken,
        zone: &str,
        node: &str,
        values: Vec<String>,
        ttl: u32,
    ) -> Result<(), Error> {
        Container::modify_txt_record(self, cancel, zone, node, values, ttl).await
    }

    async fn forget_txt_record(&self, zone: &str, node: &str) -> Result<(), Error> {
        Container::forget_txt_record(self, zone, node).await
    }
}

/// Ensure `server_name` has a valid ACME authorization, solving a dns-01
/// challenge published in `zone` if one is needed.
pub async fn verify<C, D>(
    cancel: &CancellationToken,
    client: &C,
    dns: &D,
    server_name: &str,
    zone: &str,
) -> Result<(), Error>
where
    C: AcmeClient + ?Sized,
    D: Dns + ?Sized,
{
    let authz = client.authorize(server_name).await?;

    match authz.status {
        AuthzStatus::Valid => Ok(()),
        AuthzStatus::Invalid => Err(Error::InvalidAuthorization(authz.uri)),
        _ => acquire_authorization(cancel, client, dns, &authz, zone)
            .await
            .map(|_| ()),
    }
}

async fn acquire_authorization<C, D>(
    cancel: &CancellationToken,
    client: &C,
    dns: &D,
    authz: &Authorization,
    zone: &str,
) -> Result<Authorization, Error>
where
    C: AcmeClient + ?Sized,
    D: Dns + ?Sized,
{
    let combos: Vec<Vec<usize>> = if authz.combinations.is_empty() {
        vec![(0..authz.challenges.len()).collect()]
    } else {
        authz.combinations.clone()
    };

    let mut accepted = false;
    let mut installed = false;
    let mut last_err = None;

    for combo in &combos {
        // Combinations requiring multiple simultaneous challenges are
        // unsupported.
        if combo.len() != 1 {
            continue;
        }
        let Some(challenge) = authz.challenges.get(combo[0]) else {
            continue;
        };

        match fulfill_challenge(cancel, client, challenge, dns, zone).await {
            Err(err) => last_err = Some(err),
            Ok(()) => {
                installed = true;
                match client.accept(challenge).await {
                    Ok(_) => {
                        accepted = true;
                        break;
                    }
                    Err(err) => last_err = Some(err),
                }
            }
        }
    }

    let result = if accepted {
        client.wait_authorization(&authz.uri).await
    } else {
        Err(last_err.unwrap_or(Error::NoChallengeCombination))
    };

    if installed {
        // Cleanup runs after the authorization settles, pass or fail.
        if let Err(err) = dns.forget_txt_record(zone, CHALLENGE_NODE).await {
            debug!("challenge record cleanup failed: {err}");
        }
    }

    result
}

async fn fulfill_challenge<C, D>(
    cancel: &CancellationToken,
    client: &C,
    challenge: &Challenge,
    dns: &D,
    zone: &str,
) -> Result<(), Error>
where
    C: AcmeClient + ?Sized,
    D: Dns + ?Sized,
{
    if challenge.kind != CHALLENGE_TYPE {
        return Err(Error::UnsupportedChallenge);
    }

    let value = client.dns01_challenge_record(&challenge.token)?;
    dns.modify_txt_record(cancel, zone, CHALLENGE_NODE, vec![value], CHALLENGE_TTL)
        .await
}

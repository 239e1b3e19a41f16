//! Lease keep-alive and revocation.
//!
//! Leases are created as a side effect of plugging a service endpoint. The
//! owner keeps one alive by calling [`LeaseClient::keep_alive`] well inside
//! its TTL; nothing here schedules that for you. Once a keep-alive reports
//! [`crate::Error::is_lease_gone`], every endpoint bound to the lease has
//! been removed and has to be plugged again.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{api_path, Client};
use crate::envelope;
use crate::error::Result;
use crate::types::Request;

const MIN_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(1);

/// Server-side lease identifier. Zero is never a valid lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(pub i64);

impl LeaseId {
    pub fn is_set(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for LeaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for LeaseId {
    fn from(id: i64) -> Self {
        LeaseId(id)
    }
}

/// A lease as granted by a plug call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: LeaseId,
    /// Seconds the server waits for a keep-alive before reclaiming the lease
    #[serde(default)]
    pub ttl: i64,
}

impl Lease {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl.max(0) as u64)
    }

    /// A third of the TTL, never below one second.
    pub fn keep_alive_interval(&self) -> Duration {
        (self.ttl() / 3).max(MIN_KEEP_ALIVE_INTERVAL)
    }
}

/// Lease operations of a [`Client`].
pub struct LeaseClient<'a> {
    client: &'a Client,
}

impl<'a> LeaseClient<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Restart the TTL countdown of `lease_id`.
    pub async fn keep_alive(&self, lease_id: LeaseId) -> Result<()> {
        let request = Request::post(api_path(&["leases", &lease_id.to_string()])?);
        let response = self.client.call(request).await?;
        envelope::decode_empty(&response)?.into_result()
    }

    /// End `lease_id` now, removing every endpoint bound to it.
    ///
    /// A lease that is already gone counts as revoked.
    pub async fn revoke(&self, lease_id: LeaseId) -> Result<()> {
        let request = Request::delete(api_path(&["leases", &lease_id.to_string()])?);
        let response = self.client.call(request).await?;
        match envelope::decode_empty(&response)?.into_result() {
            Err(e) if e.is_lease_gone() => {
                log::debug!("lease {} already gone: {}", lease_id, e);
                Ok(())
            }
            other => other,
        }
    }
}

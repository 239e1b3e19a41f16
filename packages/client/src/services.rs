//! Service registration and discovery.
//!
//! A service is identified by `(name, version)` and owns a set of endpoints,
//! each identified by its address. Endpoints are registered ("plugged")
//! under a lease and disappear when the lease is revoked or expires.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{api_path, Client};
use crate::envelope;
use crate::error::{Error, Result};
use crate::leases::{Lease, LeaseId};
use crate::types::Request;
use crate::watch::{self, WatchOutcome};

/// Identifies a kind of service independent of any endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServiceDescriptor {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_proto(mut self, proto: impl Into<String>) -> Self {
        self.proto = Some(proto.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn check_identity(&self) -> Result<()> {
        if self.name.is_empty() || self.version.is_empty() {
            return Err(Error::invalid_argument(format!(
                "service descriptor needs a name and a version, got {:?}/{:?}",
                self.name, self.version
            )));
        }
        Ok(())
    }
}

/// One running instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self
    }
}

/// A descriptor together with the endpoints currently registered under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(flatten)]
    pub descriptor: ServiceDescriptor,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub endpoints: Vec<ServiceEndpoint>,
}

impl Service {
    pub fn endpoint(&self, address: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.iter().find(|e| e.address == address)
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct ServiceResult {
    #[serde(default)]
    service: Option<Service>,
}

#[derive(Debug, Deserialize)]
struct AllServicesResult {
    #[serde(default)]
    services: BTreeMap<String, Service>,
}

/// Service registry operations of a [`Client`].
pub struct ServiceClient<'a> {
    client: &'a Client,
}

impl<'a> ServiceClient<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Snapshot of one service version and its endpoints.
    pub async fn get(&self, name: &str, version: &str) -> Result<Service> {
        let request = Request::get(api_path(&["services", name, version])?);
        let response = self.client.call(request).await?;
        let result: ServiceResult = envelope::decode(&response)?.into_result()?;
        result
            .service
            .ok_or_else(|| Error::protocol(format!("no service in result for {}/{}", name, version)))
    }

    /// Every version of `name`, keyed by version.
    pub async fn get_all(&self, name: &str) -> Result<BTreeMap<String, Service>> {
        let request = Request::get(api_path(&["services", name])?);
        let response = self.client.call(request).await?;
        let result: AllServicesResult = envelope::decode(&response)?.into_result()?;
        Ok(result.services)
    }

    /// Wait for the next change to the endpoint set of `(name, version)`.
    ///
    /// The server offers no revision for services, so this always means
    /// "next change after the request arrives". Changes that happen between
    /// two watch calls are only visible through [`ServiceClient::get`].
    pub async fn watch(
        &self,
        name: &str,
        version: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WatchOutcome<Service>> {
        let request = watch::watch_request(
            Request::get(api_path(&["services", name, version])?),
            timeout,
        );
        let outcome = watch::long_poll::<ServiceResult>(self.client, request, timeout, cancel).await?;
        Ok(outcome.filter_map(|result| result.service))
    }

    /// Register `endpoint` under `descriptor` and return the lease it is bound
    /// to.
    ///
    /// Without `lease_id` the server creates a lease with `ttl` (or its own
    /// default when `ttl` is `None`). With `lease_id` the endpoint joins that
    /// lease and `ttl` is ignored by the server.
    pub async fn plug(
        &self,
        descriptor: &ServiceDescriptor,
        endpoint: &ServiceEndpoint,
        ttl: Option<Duration>,
        lease_id: Option<LeaseId>,
    ) -> Result<LeaseId> {
        Ok(self.plug_lease(descriptor, endpoint, ttl, lease_id).await?.lease_id)
    }

    /// [`ServiceClient::plug`] returning the lease with its granted TTL.
    pub async fn plug_lease(
        &self,
        descriptor: &ServiceDescriptor,
        endpoint: &ServiceEndpoint,
        ttl: Option<Duration>,
        lease_id: Option<LeaseId>,
    ) -> Result<Lease> {
        descriptor.check_identity()?;
        let path = api_path(&["services", &descriptor.name, &descriptor.version])?;
        let request = lease_form(Request::post(path), ttl, lease_id)
            .with_form("desc", serde_json::to_string(descriptor)?)
            .with_form("endpoint", serde_json::to_string(endpoint)?);

        let response = self.client.call(request).await?;
        let lease: Lease = envelope::decode(&response)?.into_result()?;
        log::debug!(
            "plugged {} into {}/{} under lease {}",
            endpoint.address,
            descriptor.name,
            descriptor.version,
            lease.lease_id
        );
        Ok(lease)
    }

    /// Register one endpoint under several descriptors in a single request.
    ///
    /// The server applies all registrations or none.
    pub async fn plug_all(
        &self,
        descriptors: &[ServiceDescriptor],
        endpoint: &ServiceEndpoint,
        ttl: Option<Duration>,
        lease_id: Option<LeaseId>,
    ) -> Result<LeaseId> {
        Ok(self
            .plug_all_lease(descriptors, endpoint, ttl, lease_id)
            .await?
            .lease_id)
    }

    /// [`ServiceClient::plug_all`] returning the lease with its granted TTL.
    pub async fn plug_all_lease(
        &self,
        descriptors: &[ServiceDescriptor],
        endpoint: &ServiceEndpoint,
        ttl: Option<Duration>,
        lease_id: Option<LeaseId>,
    ) -> Result<Lease> {
        if descriptors.is_empty() {
            return Err(Error::invalid_argument("plug_all needs at least one descriptor"));
        }
        for descriptor in descriptors {
            descriptor.check_identity()?;
        }

        let request = lease_form(Request::post(api_path(&["services"])?), ttl, lease_id)
            .with_form("desces", serde_json::to_string(descriptors)?)
            .with_form("endpoint", serde_json::to_string(endpoint)?);

        let response = self.client.call(request).await?;
        envelope::decode(&response)?.into_result()
    }

    /// Remove one endpoint right away, without waiting for its lease.
    pub async fn unplug(&self, name: &str, version: &str, address: &str) -> Result<()> {
        let request = Request::delete(api_path(&["services", name, version, address])?);
        let response = self.client.call(request).await?;
        envelope::decode_empty(&response)?.into_result()
    }

    /// Replace the stored payload of a registered endpoint. The lease binding
    /// is left alone.
    pub async fn update(
        &self,
        name: &str,
        version: &str,
        address: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<()> {
        let request = Request::post(api_path(&["services", name, version, address])?)
            .with_form("endpoint", serde_json::to_string(endpoint)?);
        let response = self.client.call(request).await?;
        envelope::decode_empty(&response)?.into_result()
    }
}

fn lease_form(request: Request, ttl: Option<Duration>, lease_id: Option<LeaseId>) -> Request {
    let mut request = request;
    if let Some(ttl) = watch::effective_timeout(ttl) {
        // Rounding down would grant a shorter lease than asked for.
        request = request.with_form("ttl", watch::wire_timeout_secs(ttl));
    }
    if let Some(lease_id) = lease_id.filter(|id| id.is_set()) {
        request = request.with_form("lease_id", lease_id);
    }
    request
}

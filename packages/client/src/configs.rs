//! Versioned configuration values.
//!
//! Every stored value carries a server-assigned `version`. Passing that
//! version back to [`ConfigClient::put`] turns the write into a
//! compare-and-set; passing `0` writes unconditionally.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{api_path, Client};
use crate::config::InitialWatch;
use crate::envelope;
use crate::error::Result;
use crate::types::Request;
use crate::watch::{self, WatchOutcome};

/// Revision number of a stored value.
pub type Revision = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    pub value: String,
    pub version: Revision,
}

#[derive(Debug, Deserialize)]
struct ConfigResult {
    #[serde(default)]
    config: Option<ConfigItem>,
}

#[derive(Debug, Deserialize)]
struct PutResult {
    revision: Revision,
}

/// Config operations of a [`Client`].
pub struct ConfigClient<'a> {
    client: &'a Client,
}

impl<'a> ConfigClient<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Read the current value of `key`.
    ///
    /// Fails with a `NOT_FOUND` server error if the key was never written.
    pub async fn get(&self, key: &str) -> Result<ConfigItem> {
        let request = Request::get(api_path(&["configs", key])?);
        let response = self.client.call(request).await?;
        let result: ConfigResult = envelope::decode(&response)?.into_result()?;
        result
            .config
            .ok_or_else(|| crate::Error::protocol(format!("no config in result for {}", key)))
    }

    /// Write `value` to `key`.
    ///
    /// With `revision == 0` the write is unconditional. Otherwise the server
    /// only accepts it if the stored version still equals `revision`; a
    /// mismatch is reported as a version conflict
    /// ([`crate::Error::is_version_conflict`]).
    pub async fn put(&self, key: &str, value: &str, revision: Revision) -> Result<()> {
        let response = self.client.call(put_request(key, value, revision)?).await?;
        envelope::decode_empty(&response)?.into_result()
    }

    /// Same as [`ConfigClient::put`] but returns the revision the server
    /// assigned to the write.
    pub async fn put_revision(&self, key: &str, value: &str, revision: Revision) -> Result<Revision> {
        let response = self.client.call(put_request(key, value, revision)?).await?;
        let result: PutResult = envelope::decode(&response)?.into_result()?;
        Ok(result.revision)
    }

    /// Wait until the version of `key` is greater than `revision`.
    ///
    /// - `timeout` of `None` or zero waits until something changes.
    /// - `revision <= 0` follows the client's [`InitialWatch`] setting.
    /// - A change that is not newer than `revision` is never returned; it is
    ///   reported as [`WatchOutcome::Timeout`] so the caller simply polls
    ///   again.
    ///
    /// With [`InitialWatch::Current`] and a key that does not exist yet, a
    /// write landing between the initial read and the long-poll is only seen
    /// when that poll times out, at which point the key is read once more.
    /// Pass a `timeout` to bound that window.
    pub async fn watch(
        &self,
        key: &str,
        revision: Revision,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<WatchOutcome<ConfigItem>> {
        let mut missing = false;
        if revision <= 0 && self.client.initial_watch() == InitialWatch::Current {
            match watch::cancellable(cancel, self.get(key)).await {
                Ok(item) => return Ok(WatchOutcome::Changed(item)),
                // Not written yet: wait for it to appear.
                Err(e) if e.is_not_found() => missing = true,
                Err(e) => return Err(e),
            }
        }

        let mut request = Request::get(api_path(&["configs", key])?);
        if revision > 0 {
            request = request.with_query("revision", revision);
        }
        let request = watch::watch_request(request, timeout);

        let outcome = watch::long_poll::<ConfigResult>(self.client, request, timeout, cancel).await?;
        let outcome = outcome
            .filter_map(|result| result.config)
            .filter_map(|item| {
                if item.version > revision {
                    Some(item)
                } else {
                    log::warn!(
                        "watch on {} returned version {} not newer than {}",
                        key,
                        item.version,
                        revision
                    );
                    None
                }
            });

        if missing && outcome.is_timeout() {
            // The key may have been created before the poll was registered.
            return match watch::cancellable(cancel, self.get(key)).await {
                Ok(item) => Ok(WatchOutcome::Changed(item)),
                Err(e) if e.is_not_found() => Ok(WatchOutcome::Timeout),
                Err(e) => Err(e),
            };
        }
        Ok(outcome)
    }

    /// [`ConfigClient::watch`] without a way to cancel.
    pub async fn watch_with_timeout(
        &self,
        key: &str,
        revision: Revision,
        timeout: Option<Duration>,
    ) -> Result<WatchOutcome<ConfigItem>> {
        self.watch(key, revision, timeout, &CancellationToken::new())
            .await
    }
}

fn put_request(key: &str, value: &str, revision: Revision) -> Result<Request> {
    let mut request = Request::put(api_path(&["configs", key])?).with_form("value", value);
    if revision != 0 {
        request = request.with_form("revision", revision);
    }
    Ok(request)
}

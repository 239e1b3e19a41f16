//! Long-poll coordination shared by config and service watches.
//!
//! A watch is one request that the server holds until the watched value
//! changes or its own timeout passes. On the client side the request is
//! raced against two other events:
//!
//! - the caller's [`CancellationToken`], which yields [`Error::Cancelled`];
//! - a local deadline of `timeout + watch_grace`, which yields
//!   [`WatchOutcome::Timeout`] in case the server never answers.
//!
//! Losing the race drops the request future, which aborts the HTTP exchange.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::envelope::{self, Reply};
use crate::error::{Error, ErrorKind, Result};
use crate::types::Request;

/// Result of a watch that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome<T> {
    /// The watched value changed; this is the new value.
    Changed(T),
    /// Nothing changed before the deadline. Watch again with the same revision.
    Timeout,
}

impl<T> WatchOutcome<T> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WatchOutcome::Timeout)
    }

    pub fn changed(self) -> Option<T> {
        match self {
            WatchOutcome::Changed(value) => Some(value),
            WatchOutcome::Timeout => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WatchOutcome<U> {
        match self {
            WatchOutcome::Changed(value) => WatchOutcome::Changed(f(value)),
            WatchOutcome::Timeout => WatchOutcome::Timeout,
        }
    }

    /// Keep a change only if `f` accepts it; a rejected change counts as a
    /// timeout.
    pub fn filter_map<U>(self, f: impl FnOnce(T) -> Option<U>) -> WatchOutcome<U> {
        match self {
            WatchOutcome::Changed(value) => match f(value) {
                Some(value) => WatchOutcome::Changed(value),
                None => WatchOutcome::Timeout,
            },
            WatchOutcome::Timeout => WatchOutcome::Timeout,
        }
    }
}

/// A zero timeout means "wait forever".
pub(crate) fn effective_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

/// Whole seconds for the `timeout` query parameter, rounding up.
pub(crate) fn wire_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Add `watch=true` and the optional `timeout` to a GET request.
pub(crate) fn watch_request(request: Request, timeout: Option<Duration>) -> Request {
    let request = request.with_query("watch", true);
    match effective_timeout(timeout) {
        Some(timeout) => request.with_query("timeout", wire_timeout_secs(timeout)),
        None => request,
    }
}

/// Run a future unless the token fires first.
pub(crate) async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = future => result,
    }
}

/// Issue one long-poll request and interpret its answer.
///
/// The payload is `None` when the server answered an expired poll with an
/// empty result.
pub(crate) async fn long_poll<T: DeserializeOwned>(
    client: &Client,
    request: Request,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<WatchOutcome<T>> {
    let deadline = effective_timeout(timeout).map(|t| t + client.watch_grace());
    let path = request.path.clone();

    // The transport itself gets no deadline; the select below owns it.
    let exchange = client.send(request.with_timeout(None));
    let local_deadline = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(deadline).await,
            None => std::future::pending().await,
        }
    };

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log::debug!("watch on {} cancelled", path);
            return Err(Error::Cancelled);
        }
        _ = local_deadline => {
            log::debug!("watch on {} hit the local deadline", path);
            return Ok(WatchOutcome::Timeout);
        }
        response = exchange => response?,
    };

    match envelope::decode_optional::<T>(&response)? {
        Reply::Success(Some(value)) => Ok(WatchOutcome::Changed(value)),
        Reply::Success(None) => Ok(WatchOutcome::Timeout),
        Reply::Failure(error) if error.kind() == ErrorKind::DeadlineExceeded => {
            Ok(WatchOutcome::Timeout)
        }
        Reply::Failure(error) => Err(Error::Domain(error)),
    }
}

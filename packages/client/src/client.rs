use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{ClientConfig, InitialWatch};
use crate::configs::ConfigClient;
use crate::error::{Error, Result, TransportError};
use crate::leases::LeaseClient;
use crate::services::ServiceClient;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{Request, Response};

const API_PREFIX: &str = "api";

/// Handle to one xbus server.
///
/// Cheap to clone; clones share the transport and its connection pool.
/// Nothing in here changes after construction, so a `Client` can be used
/// from any number of tasks at once.
///
/// ```ignore
/// use xbus_client::{Client, ClientConfig};
///
/// let client = Client::new(ClientConfig::new("https://xbus.example.com:4433"))?;
/// let item = client.configs().get("db.url").await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    request_timeout: Duration,
    watch_grace: Duration,
    initial_watch: InitialWatch,
}

impl Client {
    /// Create a client backed by reqwest.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(&config, Arc::new(transport)))
    }

    /// Create a client over a custom transport.
    ///
    /// Only the timing and watch settings of `config` are used; endpoint and
    /// TLS settings belong to the transport.
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                request_timeout: config.request_timeout(),
                watch_grace: config.watch_grace(),
                initial_watch: config.initial_watch,
            }),
        }
    }

    pub fn configs(&self) -> ConfigClient<'_> {
        ConfigClient::new(self)
    }

    pub fn services(&self) -> ServiceClient<'_> {
        ServiceClient::new(self)
    }

    pub fn leases(&self) -> LeaseClient<'_> {
        LeaseClient::new(self)
    }

    pub(crate) fn watch_grace(&self) -> Duration {
        self.inner.watch_grace
    }

    pub(crate) fn initial_watch(&self) -> InitialWatch {
        self.inner.initial_watch
    }

    /// Send a request with whatever deadline it already carries.
    pub(crate) async fn send(&self, request: Request) -> Result<Response> {
        self.inner
            .transport
            .execute(request)
            .await
            .map_err(Error::from)
    }

    /// Send an ordinary (non-watch) request under the configured deadline.
    pub(crate) async fn call(&self, request: Request) -> Result<Response> {
        let timeout = self.inner.request_timeout;
        self.send(request.with_timeout(Some(timeout))).await
    }
}

/// Build `/api/{segments...}` with every segment percent-encoded.
///
/// Empty, `.` and `..` segments are rejected: URL normalization would drop
/// them and the request would reach a different resource.
pub(crate) fn api_path(segments: &[&str]) -> Result<String> {
    if let Some(position) = segments.iter().position(|s| s.is_empty()) {
        return Err(Error::invalid_argument(format!(
            "path segment {} must not be empty",
            position
        )));
    }
    if let Some(segment) = segments.iter().find(|s| matches!(**s, "." | "..")) {
        return Err(Error::invalid_argument(format!(
            "path segment {:?} is not a valid name",
            segment
        )));
    }

    let mut url = Url::parse("http://xbus/").map_err(TransportError::from)?;
    url.path_segments_mut()
        .map_err(|_| Error::protocol("base URL cannot carry a path"))?
        .clear()
        .push(API_PREFIX)
        .extend(segments);
    Ok(url.path().to_string())
}

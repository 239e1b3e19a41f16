//! HTTP transport abstraction.
//!
//! The clients only ever talk to a [`Transport`]. Production code uses
//! [`ReqwestTransport`]; unit tests swap in [`mock::MockTransport`] so no
//! network is involved.

use std::fs;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Certificate, Client, Identity};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{Error, Result, TransportError};
use crate::types::{Request, Response};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for executing xbus requests.
///
/// Implementations must be safe to share across concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a request and return the raw response.
    ///
    /// Any HTTP status counts as a response; only failures to get one at all
    /// are errors.
    async fn execute(&self, request: Request) -> std::result::Result<Response, TransportError>;
}

/// Production transport using reqwest.
pub struct ReqwestTransport {
    client: Client,
    endpoint: Url,
}

impl ReqwestTransport {
    /// Build a transport for the given configuration, loading the CA bundle
    /// and client identity if configured.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(ca_file) = &config.ca_cert_file {
            let pem = fs::read(ca_file).map_err(|e| {
                Error::config(format!("cannot read CA certificate {}: {}", ca_file.display(), e))
            })?;
            let certificates = Certificate::from_pem_bundle(&pem)
                .map_err(|e| Error::config(format!("add cacert fail: {}", e)))?;
            if certificates.is_empty() {
                return Err(Error::config(format!(
                    "no certificate found in {}",
                    ca_file.display()
                )));
            }
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        if let (Some(cert_file), Some(key_file)) = (&config.cert_file, &config.key_file) {
            let mut pem = fs::read(cert_file).map_err(|e| {
                Error::config(format!("cannot read certificate {}: {}", cert_file.display(), e))
            })?;
            let key = fs::read(key_file).map_err(|e| {
                Error::config(format!("cannot read key {}: {}", key_file.display(), e))
            })?;
            pem.push(b'\n');
            pem.extend_from_slice(&key);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| Error::config(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        let client = builder.build().map_err(TransportError::from)?;

        Ok(Self { client, endpoint })
    }

    /// Build the full URL from the endpoint and the request path.
    fn build_url(&self, path: &str) -> std::result::Result<Url, TransportError> {
        let base = self.endpoint.as_str().trim_end_matches('/');
        Url::parse(&format!("{}{}", base, path)).map_err(TransportError::from)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> std::result::Result<Response, TransportError> {
        let url = self.build_url(&request.path)?;
        log::debug!("{} {}", request.method, url);

        let mut req_builder = self.client.request(request.method.into(), url);

        if !request.query.is_empty() {
            req_builder = req_builder.query(&request.query);
        }

        if let Some(form) = &request.form {
            req_builder = req_builder.form(form);
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = req_builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        log::debug!("{} {} -> {}", request.method, request.path, status);

        Ok(Response { status, body })
    }
}

/// Mock transport for testing.
///
/// Returns queued or per-path responses and records every request.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// What the mock does for a request.
    #[derive(Clone)]
    pub enum Scripted {
        Respond(Response),
        Fail(String),
        /// Never answer; only useful with cancellation or deadlines.
        Hang,
    }

    #[derive(Clone, Default)]
    pub struct MockTransport {
        /// Responses consumed in order, before `by_path` is consulted.
        queue: Arc<Mutex<VecDeque<Scripted>>>,
        /// Responses keyed by request path.
        by_path: Arc<Mutex<HashMap<String, Scripted>>>,
        /// Recorded requests for verification.
        recorded_requests: Arc<Mutex<Vec<Request>>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a JSON envelope with status 200.
        pub fn then_json(self, body: serde_json::Value) -> Self {
            self.then(Scripted::Respond(Response::new(200, body.to_string())))
        }

        pub fn then(self, scripted: Scripted) -> Self {
            self.queue.lock().unwrap().push_back(scripted);
            self
        }

        pub fn with_path(self, path: impl Into<String>, body: serde_json::Value) -> Self {
            self.by_path.lock().unwrap().insert(
                path.into(),
                Scripted::Respond(Response::new(200, body.to_string())),
            );
            self
        }

        pub fn recorded_requests(&self) -> Vec<Request> {
            self.recorded_requests.lock().unwrap().clone()
        }

        pub fn last_request(&self) -> Request {
            self.recorded_requests()
                .pop()
                .expect("no request was recorded")
        }

        pub fn ok(result: serde_json::Value) -> serde_json::Value {
            serde_json::json!({ "ok": true, "result": result })
        }

        pub fn failure(code: &str, message: &str) -> serde_json::Value {
            serde_json::json!({ "ok": false, "error": { "code": code, "message": message } })
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(
            &self,
            request: Request,
        ) -> std::result::Result<Response, TransportError> {
            self.recorded_requests.lock().unwrap().push(request.clone());

            let scripted = self
                .queue
                .lock()
                .unwrap()
                .pop_front()
                .or_else(|| self.by_path.lock().unwrap().get(&request.path).cloned());

            match scripted {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::Fail(message)) => Err(TransportError::other(message)),
                Some(Scripted::Hang) => std::future::pending().await,
                None => Ok(Response::new(404, "404 page not found")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockTransport, Scripted};
    use super::*;
    use crate::types::Method;

    #[tokio::test]
    async fn mock_transport_returns_queued_then_path_responses() {
        let transport = MockTransport::new()
            .then_json(MockTransport::ok(serde_json::json!({"revision": 1})))
            .with_path("/api/leases/1", serde_json::json!({"ok": true}));

        let first = transport.execute(Request::get("/api/leases/1")).await.unwrap();
        assert!(first.body.contains("revision"));

        let second = transport.execute(Request::get("/api/leases/1")).await.unwrap();
        assert_eq!(second.body, r#"{"ok":true}"#);

        let third = transport.execute(Request::get("/other")).await.unwrap();
        assert_eq!(third.status, 404);
    }

    #[tokio::test]
    async fn mock_transport_records_requests() {
        let transport = MockTransport::new().then(Scripted::Fail("connection refused".into()));

        let err = transport
            .execute(Request::delete("/api/leases/3"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");

        let recorded = transport.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, Method::DELETE);
        assert_eq!(recorded[0].path, "/api/leases/3");
    }

    #[test]
    fn reqwest_transport_joins_endpoint_and_path() {
        let config = ClientConfig::new("http://127.0.0.1:4433/");
        let transport = ReqwestTransport::new(&config).unwrap();
        let url = transport.build_url("/api/configs/db.url").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:4433/api/configs/db.url");
    }

    #[test]
    fn reqwest_transport_keeps_endpoint_prefix() {
        let config = ClientConfig::new("https://registry.example.com/xbus");
        let transport = ReqwestTransport::new(&config).unwrap();
        let url = transport.build_url("/api/leases/5").unwrap();
        assert_eq!(url.as_str(), "https://registry.example.com/xbus/api/leases/5");
    }

    #[test]
    fn reqwest_transport_rejects_missing_ca_file() {
        let config = ClientConfig::new("https://registry.example.com")
            .with_ca_cert_file("/nonexistent/ca.pem");
        let err = ReqwestTransport::new(&config).err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }
}

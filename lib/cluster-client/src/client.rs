//! REST client bound to one resolved cluster configuration

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cluster_core::{ClusterError, ParseSource, ResolvedConfig, Result};
use futures::FutureExt;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::path::resource_path;
use crate::tls::TlsClientConfig;
use crate::watch::{watch_stream, WatchStream};

/// Transport settings for a [`ClusterClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Upper bound for a single REST call; never applied to watches
    pub request_timeout: Duration,
    /// TCP and TLS connect timeout
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("cluster-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Selectors for list calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

impl ListOptions {
    fn query_pairs(&self) -> Vec<(String, String)> {
        selector_pairs(self.label_selector.as_deref(), self.field_selector.as_deref())
    }
}

/// Selectors and starting point for watch calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Only deliver changes newer than this version
    pub resource_version: Option<String>,
}

impl WatchOptions {
    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs =
            selector_pairs(self.label_selector.as_deref(), self.field_selector.as_deref());
        if let Some(version) = self.resource_version.as_deref().filter(|v| !v.is_empty()) {
            pairs.push(("resourceVersion".to_string(), version.to_string()));
        }
        pairs
    }
}

fn selector_pairs(label: Option<&str>, field: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(selector) = label.filter(|s| !s.is_empty()) {
        pairs.push(("labelSelector".to_string(), selector.to_string()));
    }
    if let Some(selector) = field.filter(|s| !s.is_empty()) {
        pairs.push(("fieldSelector".to_string(), selector.to_string()));
    }
    pairs
}

/// Everything needed to issue one call. Built per call and dropped after it.
#[derive(Clone, PartialEq)]
pub struct RequestContext {
    pub method: Method,
    /// Path relative to the server URL, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer_token: Option<String>,
    /// Namespace the call targets, reported on request failures
    pub namespace: Option<String>,
    pub timeout: Option<Duration>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer_token: None,
            namespace: None,
            timeout: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn in_namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty()).map(str::to_string);
        self
    }

    fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body", &self.body.is_some())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Deserialize)]
struct ItemList<T> {
    items: Option<Vec<T>>,
}

/// Client for the cluster REST API.
///
/// Cloning is cheap: clones share the connection pool and the bound
/// configuration.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    config: Arc<ResolvedConfig>,
    http: reqwest::Client,
    base_url: String,
    options: ClientOptions,
}

impl ClusterClient {
    /// Bind a client to `config` with default options
    pub fn new(config: ResolvedConfig) -> Result<Self> {
        Self::with_options(config, ClientOptions::default())
    }

    pub fn with_options(config: ResolvedConfig, options: ClientOptions) -> Result<Self> {
        let base_url = config.cluster.server.trim_end_matches('/').to_string();
        if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
            return Err(ClusterError::InvalidConfig(format!(
                "server URL must start with https:// or http://, got: {}",
                config.cluster.server
            )));
        }

        let builder = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent.clone());
        let http = TlsClientConfig::from_config(&config)
            .apply(builder)?
            .build()
            .map_err(|e| {
                ClusterError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        info!("Cluster client created for {}", base_url);

        Ok(Self {
            config: Arc::new(config),
            http,
            base_url,
            options,
        })
    }

    /// The configuration this client is bound to
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Start a call context carrying the bound credentials
    pub fn build_request_options(&self, method: Method, path: impl Into<String>) -> RequestContext {
        let mut ctx = RequestContext::new(method, path);
        ctx.bearer_token = self.config.user.token().map(str::to_string);
        ctx.timeout = Some(self.options.request_timeout);
        ctx
    }

    pub async fn get_resource<T: DeserializeOwned>(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<T> {
        let path = resource_path(api_version, kind, name, namespace);
        let ctx = self
            .build_request_options(Method::GET, path)
            .in_namespace(namespace);
        self.request_json(ctx).await
    }

    /// List a collection, returning its `items`
    pub async fn list_resources<T: DeserializeOwned>(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        options: &ListOptions,
    ) -> Result<Vec<T>> {
        let path = resource_path(api_version, kind, "", namespace);
        let mut ctx = self
            .build_request_options(Method::GET, path)
            .in_namespace(namespace);
        ctx.query.extend(options.query_pairs());

        let list: ItemList<T> = self.request_json(ctx).await?;
        let items = list.items.unwrap_or_default();
        debug!("Listed {} {} item(s)", items.len(), kind);
        Ok(items)
    }

    /// POST `resource` to its collection
    pub async fn create_resource<B, T>(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        resource: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = resource_path(api_version, kind, "", namespace);
        let ctx = self
            .build_request_options(Method::POST, path)
            .in_namespace(namespace);
        let body = encode_body(resource, &ctx)?;
        self.request_json(ctx.with_body(body)).await
    }

    /// PUT `resource` over the named object
    pub async fn update_resource<B, T>(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
        resource: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = resource_path(api_version, kind, name, namespace);
        let ctx = self
            .build_request_options(Method::PUT, path)
            .in_namespace(namespace);
        let body = encode_body(resource, &ctx)?;
        self.request_json(ctx.with_body(body)).await
    }

    /// DELETE the named object. `None` when the server answers 204.
    pub async fn delete_resource<T: DeserializeOwned>(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<T>> {
        let path = resource_path(api_version, kind, name, namespace);
        let ctx = self
            .build_request_options(Method::DELETE, path)
            .in_namespace(namespace);
        self.request_json(ctx).await
    }

    /// Fetch the log of a pod as plain text
    pub async fn get_pod_logs(
        &self,
        name: &str,
        namespace: &str,
        container: Option<&str>,
    ) -> Result<String> {
        let path = format!("{}/log", resource_path("v1", "Pod", name, Some(namespace)));
        let mut ctx = self
            .build_request_options(Method::GET, path)
            .in_namespace(Some(namespace));
        if let Some(container) = container.filter(|c| !c.is_empty()) {
            ctx = ctx.with_query("container", container);
        }

        let label = ctx.describe();
        let response = self.execute(ctx).await?;
        response
            .text()
            .await
            .map_err(|e| ClusterError::network(format!("Failed to read body of {}", label), e))
    }

    /// Open a watch on a collection.
    ///
    /// Nothing is sent until the returned stream is first polled.
    pub fn watch_resource<T>(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        options: &WatchOptions,
    ) -> WatchStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = resource_path(api_version, kind, "", namespace);
        let mut ctx = self
            .build_request_options(Method::GET, path)
            .in_namespace(namespace)
            .with_query("watch", "true");
        ctx.query.extend(options.query_pairs());
        ctx.timeout = None;

        info!("Watching {}", ctx.describe());
        let client = self.clone();
        watch_stream(async move { client.execute(ctx).await }.boxed())
    }

    /// Send a call and return the response if its status is 2xx
    pub async fn execute(&self, ctx: RequestContext) -> Result<Response> {
        let request = self
            .request_builder(&ctx)
            .build()
            .map_err(|e| ClusterError::Request {
                method: ctx.method.to_string(),
                resource: ctx.path.clone(),
                namespace: ctx.namespace.clone(),
                source: e.into(),
            })?;

        debug!("{} {}", ctx.method, request.url());
        let response = self.http.execute(request).await.map_err(|e| {
            warn!("{} failed: {}", ctx.describe(), e);
            ClusterError::network(format!("{} failed", ctx.describe()), e)
        })?;

        check_status(response).await
    }

    async fn request_json<T: DeserializeOwned>(&self, ctx: RequestContext) -> Result<T> {
        let label = ctx.describe();
        let response = self.execute(ctx).await?;
        read_json(response, &label).await
    }

    fn request_builder(&self, ctx: &RequestContext) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, ctx.path);
        let mut builder = self.http.request(ctx.method.clone(), url);
        if !ctx.query.is_empty() {
            builder = builder.query(&ctx.query);
        }
        if let Some(token) = &ctx.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &ctx.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = ctx.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

fn encode_body<B: Serialize + ?Sized>(resource: &B, ctx: &RequestContext) -> Result<Value> {
    serde_json::to_value(resource).map_err(|e| {
        warn!("Cannot encode body of {}: {}", ctx.describe(), e);
        ClusterError::Request {
            method: ctx.method.to_string(),
            resource: ctx.path.clone(),
            namespace: ctx.namespace.clone(),
            source: e.into(),
        }
    })
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            debug!("Failed to read error body (status {}): {}", status.as_u16(), e);
            String::new()
        }
    };
    let message = api_error_message(status, &raw_body);
    warn!("API returned {}: {}", status.as_u16(), message);
    Err(ClusterError::Api {
        status_code: status.as_u16(),
        message,
        raw_body,
    })
}

/// `message` of a Status object, else the body, else the reason phrase
fn api_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            if !message.is_empty() {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status.canonical_reason().unwrap_or("unknown status").to_string()
}

/// Decode a 2xx body. A 204 decodes as JSON `null`, so `Option<T>`, `Value`
/// and `()` accept it and other types fail with `Parsing`.
async fn read_json<T: DeserializeOwned>(response: Response, label: &str) -> Result<T> {
    if response.status() == StatusCode::NO_CONTENT {
        return serde_json::from_value(Value::Null).map_err(|e| {
            warn!("{} answered 204 but a body was required: {}", label, e);
            ClusterError::parsing(
                ParseSource::ResponseBody,
                format!("response body of {}", label),
                e,
                "",
            )
        });
    }

    let text = response
        .text()
        .await
        .map_err(|e| ClusterError::network(format!("Failed to read body of {}", label), e))?;

    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!("Undecodable response to {}: {}", label, e);
            Err(ClusterError::parsing(
                ParseSource::ResponseBody,
                format!("response body of {}", label),
                e,
                text,
            ))
        }
    }
}

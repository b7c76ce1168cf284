use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{cookie::Jar, header, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::{
    config::Config,
    error::UnifiError,
    metrics::{Metrics, PROVIDER_NAME},
};

const CSRF_HEADER: &str = "x-csrf-token";
const API_KEY_HEADER: &str = "X-Api-Key";

/// How much of an error response body is kept for diagnostics.
const ERROR_BODY_LIMIT: usize = 512;

/// Path templates for the two controller topologies. `{site}` is replaced
/// with the configured site identifier.
#[derive(Debug, Clone, Copy)]
struct ClientUrls {
    login: &'static str,
    records: &'static str,
}

/// Controller reached through the onboard gateway proxy (UDM and friends).
const GATEWAY_URLS: ClientUrls = ClientUrls {
    login: "/api/auth/login",
    records: "/proxy/network/v2/api/site/{site}/static-dns",
};

/// Standalone controller reached directly.
const CONTROLLER_URLS: ClientUrls = ClientUrls {
    login: "/api/login",
    records: "/v2/api/site/{site}/static-dns",
};

/// Error envelope the controller returns on non-200 responses.
#[derive(Debug, Default, Deserialize)]
pub struct UnifiErrorResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

/// The one authenticated channel to the UniFi controller.
///
/// Hides from callers whether auth is a static API key or the
/// cookie-plus-CSRF session flow. The CSRF token is the only mutable
/// state; it sits behind a mutex so concurrent webhook requests adopt
/// rotated tokens without racing.
pub struct Transport {
    http: reqwest::Client,
    host: String,
    site: String,
    api_key: Option<String>,
    user: String,
    password: String,
    csrf: Mutex<String>,
    urls: ClientUrls,
    metrics: Arc<Metrics>,
}

impl Transport {
    /// Build the HTTP client and, in session mode, perform the initial
    /// login. A failed initial login is fatal: there is no degraded mode.
    pub async fn new(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .danger_accept_invalid_certs(config.unifi_skip_tls_verify)
            .build()?;

        let urls = if config.unifi_external_controller {
            CONTROLLER_URLS
        } else {
            GATEWAY_URLS
        };

        let transport = Self {
            http,
            host: config.unifi_host.trim_end_matches('/').to_string(),
            site: config.unifi_site.clone(),
            api_key: config.api_key().map(String::from),
            user: config.unifi_user.clone().unwrap_or_default(),
            password: config.unifi_pass.clone().unwrap_or_default(),
            csrf: Mutex::new(String::new()),
            urls,
            metrics,
        };

        if transport.api_key.is_none() {
            warn!("UNIFI_USER and UNIFI_PASSWORD are deprecated, please switch to UNIFI_API_KEY");
            transport.login().await?;
        }

        Ok(transport)
    }

    pub fn login_url(&self) -> String {
        format!("{}{}", self.host, self.urls.login)
    }

    pub fn records_url(&self) -> String {
        format!("{}{}", self.host, self.urls.records.replace("{site}", &self.site))
    }

    pub fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.records_url(), id)
    }

    /// Authenticate with username/password. Only meaningful in session
    /// mode; safe to call repeatedly (re-login after expiry).
    pub async fn login(&self) -> Result<(), UnifiError> {
        let url = self.login_url();
        let body = json!({
            "username": self.user,
            "password": self.password,
            "remember": true,
        });

        let resp = match self
            .http
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                self.login_failed();
                return Err(UnifiError::Network {
                    operation: "POST".into(),
                    url,
                    source: err,
                });
            }
        };

        let status = resp.status();
        if status != StatusCode::OK {
            self.login_failed();
            let response = resp.text().await.unwrap_or_default();
            error!(status = %status, response = %snippet(&response), "login failed");
            return Err(UnifiError::Auth {
                operation: "login".into(),
                status: status.as_u16(),
                message: snippet(&response).to_string(),
            });
        }

        self.metrics
            .unifi_login_total
            .with_label_values(&[PROVIDER_NAME, "success"])
            .inc();
        self.metrics
            .unifi_connected
            .with_label_values(&[PROVIDER_NAME])
            .set(1.0);

        self.adopt_csrf(&resp);
        debug!("login successful");

        Ok(())
    }

    fn login_failed(&self) {
        self.metrics
            .unifi_login_total
            .with_label_values(&[PROVIDER_NAME, "failure"])
            .inc();
        self.metrics
            .unifi_connected
            .with_label_values(&[PROVIDER_NAME])
            .set(0.0);
    }

    /// Perform an authenticated request. In session mode a 401 triggers
    /// exactly one re-login followed by one replay of the original
    /// request; any remaining non-200 becomes a typed error.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, UnifiError> {
        let mut resp =
            self.send(method.clone(), url, body)
                .await
                .map_err(|err| UnifiError::Network {
                    operation: method.to_string(),
                    url: url.to_string(),
                    source: err,
                })?;

        if self.api_key.is_none() {
            self.adopt_csrf(&resp);

            if resp.status() == StatusCode::UNAUTHORIZED {
                resp = self.relogin_and_retry(&method, url, body).await?;
            }
        }

        if resp.status() != StatusCode::OK {
            return Err(self.error_response(resp, &method, url).await);
        }

        Ok(resp)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> reqwest::Result<Response> {
        let mut req = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8");

        req = match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key),
            None => req.header(CSRF_HEADER, self.csrf_token()),
        };

        if let Some(body) = body {
            req = req.body(body.to_string());
        }

        req.send().await
    }

    async fn relogin_and_retry(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Response, UnifiError> {
        self.metrics
            .unifi_relogin_total
            .with_label_values(&[PROVIDER_NAME])
            .inc();
        debug!("received 401 unauthorized, attempting to re-login");

        if let Err(err) = self.login().await {
            error!(error = %err, "re-login failed");
            return Err(err);
        }

        debug!("retrying request after re-login");
        self.send(method.clone(), url, body)
            .await
            .map_err(|err| UnifiError::Network {
                operation: format!("{method} (retry)"),
                url: url.to_string(),
                source: err,
            })
    }

    /// Adopt a rotated CSRF token from a response, if present.
    fn adopt_csrf(&self, resp: &Response) {
        let Some(token) = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
        else {
            return;
        };

        let mut csrf = self.csrf.lock().unwrap_or_else(PoisonError::into_inner);
        if *csrf != token {
            self.metrics
                .unifi_csrf_refreshes_total
                .with_label_values(&[PROVIDER_NAME])
                .inc();
        }
        *csrf = token.to_string();
    }

    fn csrf_token(&self) -> String {
        self.csrf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Translate a non-200 response into an `Api` error carrying the
    /// controller's error-envelope message.
    async fn error_response(&self, resp: Response, method: &Method, url: &str) -> UnifiError {
        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(err) => return UnifiError::data("read", "error response body", err),
        };

        let envelope: UnifiErrorResponse = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(err) => return UnifiError::data("deserialize", "API error response", err),
        };

        UnifiError::Api {
            operation: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            message: snippet(&envelope.message).to_string(),
        }
    }
}

/// First `ERROR_BODY_LIMIT` bytes of a body, respecting UTF-8 boundaries.
fn snippet(body: &str) -> &str {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

//! HTTP clients for the authentication, mail and logging collaborators.
//!
//! Every call is a single JSON POST with a per-request timeout; nothing is
//! retried here.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::config::Config;

/// Build the HTTP client shared by all collaborators.
pub fn http_client() -> reqwest::Result<Client> {
    Client::builder().pool_max_idle_per_host(100).build()
}

/// A single collaborator endpoint.
#[derive(Debug, Clone)]
pub struct Collaborator {
    name: &'static str,
    http: Client,
    url: Url,
    timeout: Duration,
}

impl Collaborator {
    /// Resolve `path` against `base` (e.g. `http://mail-service` + `send`).
    pub fn new(
        name: &'static str,
        http: Client,
        base: &str,
        path: &str,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let url = endpoint(base, path)?;
        Ok(Self {
            name,
            http,
            url,
            timeout,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// POST `payload` as JSON.
    pub async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> reqwest::Result<Response> {
        debug!(collaborator = self.name, url = %self.url, "collaborator_request_starting");

        let response = self
            .http
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await;

        match &response {
            Ok(resp) => debug!(
                collaborator = self.name,
                status_code = resp.status().as_u16(),
                "collaborator_request_complete"
            ),
            Err(e) if e.is_timeout() => error!(
                collaborator = self.name,
                timeout_seconds = self.timeout.as_secs_f64(),
                error = %e,
                "collaborator_request_timeout"
            ),
            Err(e) => error!(
                collaborator = self.name,
                error = %e,
                "collaborator_request_error"
            ),
        }

        response
    }
}

/// The three collaborators, built from configuration.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub auth: Collaborator,
    pub mail: Collaborator,
    pub logger: Collaborator,
}

impl Collaborators {
    pub fn from_config(config: &Config, http: Client) -> Result<Self, url::ParseError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Ok(Self {
            auth: Collaborator::new(
                "authentication",
                http.clone(),
                &config.auth_service_url,
                "authenticate",
                timeout,
            )?,
            mail: Collaborator::new("mail", http.clone(), &config.mail_service_url, "send", timeout)?,
            logger: Collaborator::new("logger", http, &config.logger_service_url, "log", timeout)?,
        })
    }
}

/// Join `path` onto `base`, treating `base` as a directory.
fn endpoint(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_bare_host() {
        let url = endpoint("http://logger-service", "log").unwrap();
        assert_eq!(url.as_str(), "http://logger-service/log");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = endpoint("http://gateway:8080/mail", "send").unwrap();
        assert_eq!(url.as_str(), "http://gateway:8080/mail/send");

        let url = endpoint("http://gateway:8080/mail/", "send").unwrap();
        assert_eq!(url.as_str(), "http://gateway:8080/mail/send");
    }

    #[test]
    fn test_endpoint_invalid_base() {
        assert!(endpoint("not a url", "log").is_err());
    }
}

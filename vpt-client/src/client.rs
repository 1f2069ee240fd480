// vpt-client/src/client.rs
// ============================================================================
// Module: Proxy Client
// Description: Blocking HTTP client implementing the §4.5 proxying rules.
// Purpose: Give `vpt-server` a `/server/X` → `/host/X` path-substitution
//          proxy call, an async task submit/poll pair, and give `vpt-host`
//          a register/heartbeat call back to the Server — all through one
//          timed-out `reqwest::blocking::Client`.
// Dependencies: vpt-core, reqwest (blocking)
// ============================================================================

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use vpt_core::core::ids::HostId;
use vpt_core::core::ids::TaskId;
use vpt_core::core::ids::TeamId;

use crate::error::ClientError;
use crate::model::ExecuteTaskResponse;
use crate::model::HostRegistration;
use crate::model::TaskStatus;

/// Header carrying the authenticated team scope on every proxied call
/// (§4.5 "The proxy adds `team_id` and authenticated user context as
/// headers").
pub const TEAM_ID_HEADER: &str = "x-vpt-team-id";
/// Header carrying the authenticated user context on every proxied call.
pub const USER_HEADER: &str = "x-vpt-user";

/// Blocking HTTP client shared by the Server (proxying to Hosts) and the
/// Host (registering with / heartbeating to the Server). One instance per
/// process; `reqwest::blocking::Client` is internally pooled and `Sync`.
#[derive(Clone)]
pub struct ProxyClient {
    inner: Client,
}

impl ProxyClient {
    /// Builds a client with the given per-call timeout (§4.5: default 30s
    /// for control calls).
    ///
    /// # Errors
    /// Returns [`ClientError::Transport`] if the underlying TLS/connector
    /// setup fails.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let inner = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ClientError::Transport { url: "<client construction>".to_string(), source })?;
        Ok(Self { inner })
    }

    /// Rewrites a Server-facing path to the Host-facing equivalent by plain
    /// prefix substitution (§4.5 Model: "`/server/X` proxies to `/host/X`").
    #[must_use]
    pub fn translate_path(server_path: &str) -> String {
        if let Some(rest) = server_path.strip_prefix("/server/") {
            format!("/host/{rest}")
        } else if server_path == "/server" {
            "/host".to_string()
        } else {
            server_path.to_string()
        }
    }

    fn with_context(
        &self,
        method: Method,
        url: &str,
        team_id: Option<&TeamId>,
        user: Option<&str>,
    ) -> reqwest::blocking::RequestBuilder {
        let mut builder = self.inner.request(method, url);
        if let Some(team_id) = team_id {
            builder = builder.header(TEAM_ID_HEADER, team_id.as_str());
        }
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        builder
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Result<T, ClientError> {
        let response = builder.send().map_err(|source| classify_send_error(url, source))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Status { url: url.to_string(), status: status.as_u16(), body });
        }
        let bytes = response.bytes().map_err(|source| ClientError::Transport { url: url.to_string(), source })?;
        serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode { url: url.to_string(), source })
    }

    /// A generic proxied call: forwards `method`/`body` to `host_base_url`
    /// plus the Host-translated form of `server_path`, with team/user
    /// headers attached, and decodes the JSON response as `Value` (§4.5).
    ///
    /// # Errors
    /// Returns [`ClientError`] on transport failure, timeout, non-2xx
    /// status, or undecodable response body.
    pub fn proxy(
        &self,
        host_base_url: &str,
        server_path: &str,
        method: Method,
        team_id: &TeamId,
        user: &str,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = format!("{host_base_url}{}", Self::translate_path(server_path));
        let mut builder = self.with_context(method, &url, Some(team_id), Some(user));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send_json(builder, &url)
    }

    /// `POST /host/{kind}/executeTask`: returns a `task_id` immediately
    /// (§4.5, §6.2).
    ///
    /// # Errors
    /// See [`Self::proxy`].
    pub fn execute_task<B: Serialize>(
        &self,
        host_base_url: &str,
        kind: &str,
        team_id: &TeamId,
        user: &str,
        body: &B,
    ) -> Result<ExecuteTaskResponse, ClientError> {
        let url = format!("{host_base_url}/host/{kind}/executeTask");
        let builder = self.with_context(Method::POST, &url, Some(team_id), Some(user)).json(body);
        self.send_json(builder, &url)
    }

    /// `GET /host/{kind}/status?task_id=&since=`: polled every ~1s by the
    /// Server (§4.5). `since` restricts `execution_log_delta` to entries
    /// strictly after the given index (§5).
    ///
    /// # Errors
    /// See [`Self::proxy`].
    pub fn task_status(
        &self,
        host_base_url: &str,
        kind: &str,
        team_id: &TeamId,
        task_id: &TaskId,
        since: u64,
    ) -> Result<TaskStatus, ClientError> {
        let url = format!(
            "{host_base_url}/host/{kind}/status?task_id={}&since={since}",
            task_id.as_str()
        );
        let builder = self.with_context(Method::GET, &url, Some(team_id), None);
        self.send_json(builder, &url)
    }

    /// `POST /server/hosts/register`: a Host declaring itself and its
    /// devices to the Server at startup (§4.5 Model).
    ///
    /// # Errors
    /// See [`Self::proxy`].
    pub fn register_host(&self, server_base_url: &str, registration: &HostRegistration) -> Result<(), ClientError> {
        let url = format!("{server_base_url}/server/hosts/register");
        let builder = self.with_context(Method::POST, &url, None, None).json(registration);
        let response = builder.send().map_err(|source| classify_send_error(&url, source))?;
        check_empty_success(&url, response)
    }

    /// `POST /server/hosts/heartbeat`: sent every `heartbeat_interval`
    /// (§4.5 "Heartbeat / failure detection").
    ///
    /// # Errors
    /// See [`Self::proxy`].
    pub fn send_heartbeat(&self, server_base_url: &str, host_id: &HostId) -> Result<(), ClientError> {
        let url = format!("{server_base_url}/server/hosts/heartbeat");
        let body = serde_json::json!({ "host_id": host_id.as_str() });
        let builder = self.with_context(Method::POST, &url, None, None).json(&body);
        let response = builder.send().map_err(|source| classify_send_error(&url, source))?;
        check_empty_success(&url, response)
    }
}

fn check_empty_success(url: &str, response: reqwest::blocking::Response) -> Result<(), ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().unwrap_or_default();
        Err(ClientError::Status { url: url.to_string(), status: status.as_u16(), body })
    }
}

fn classify_send_error(url: &str, source: reqwest::Error) -> ClientError {
    if source.is_timeout() {
        ClientError::Timeout { url: url.to_string() }
    } else {
        ClientError::Transport { url: url.to_string(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_path_rewrites_server_prefix() {
        assert_eq!(ProxyClient::translate_path("/server/navigationTrees/1/full"), "/host/navigationTrees/1/full");
    }

    #[test]
    fn translate_path_leaves_unrelated_paths_alone() {
        assert_eq!(ProxyClient::translate_path("/health"), "/health");
    }

    #[test]
    fn translate_path_handles_bare_server_root() {
        assert_eq!(ProxyClient::translate_path("/server"), "/host");
    }
}

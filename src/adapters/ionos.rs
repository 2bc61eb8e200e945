//! IONOS Cloud API client (`/cloudapi/v6`).
//!
//! Authenticates with HTTP basic auth. Mutating endpoints answer
//! `202 Accepted` and put the URL of the request status resource in the
//! `Location` header; that URL is the tracking handle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientError, ClientResult, ResourceClient};
use crate::config::BuildConfig;
use crate::domain::{
    Collection, Datacenter, Image, Lan, RequestStatus, Server, Snapshot, Submitted,
    TrackingHandle, Volume,
};

/// Depth for nested entities; servers need volumes and NIC IPs inlined
const DEFAULT_DEPTH: u32 = 5;

/// IONOS Cloud API client
pub struct IonosClient {
    /// API base, e.g. https://api.ionos.com/cloudapi/v6
    base_url: String,
    username: String,
    password: String,
    depth: u32,
    client: reqwest::Client,
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    messages: Vec<ApiErrorMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorMessage {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct SnapshotForm<'a> {
    name: &'a str,
    description: &'a str,
}

impl IonosClient {
    /// Every call is bounded by `request_timeout`
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        request_timeout: Duration,
    ) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            depth: DEFAULT_DEPTH,
            client,
        })
    }

    pub fn from_config(config: &BuildConfig) -> ClientResult<Self> {
        Self::new(
            &config.url,
            &config.username,
            &config.password,
            Duration::from_secs(config.request_timeout_seconds),
        )
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Tracking handles are usually absolute; tolerate relative ones
    fn handle_url(&self, handle: &TrackingHandle) -> String {
        let raw = handle.as_str();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            self.api_url(raw)
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("depth", self.depth)])
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.request(Method::GET, self.api_url(path)).send().await?;
        let (body, _) = decode(response, path).await?;
        Ok(body)
    }

    async fn submit<B, T>(&self, path: &str, body: &B) -> ClientResult<Submitted<T>>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::POST, self.api_url(path))
            .json(body)
            .send()
            .await?;
        let (resource, handle) = decode(response, path).await?;
        Ok(Submitted::new(resource, handle))
    }
}

/// Read the response, map failing statuses to errors, then parse the body
async fn decode<T: DeserializeOwned>(
    response: Response,
    what: &str,
) -> ClientResult<(T, Option<TrackingHandle>)> {
    let status = response.status().as_u16();
    let handle = tracking_handle(response.headers());
    let body = response.text().await?;

    check_status(status, &body, what)?;
    debug!(what, status, "API call succeeded");

    Ok((serde_json::from_str(&body)?, handle))
}

/// Any status >= 300 is a failure, whatever the body says
fn check_status(status: u16, body: &str, what: &str) -> ClientResult<()> {
    if status == 404 {
        return Err(ClientError::NotFound(what.to_string()));
    }
    if status >= 300 {
        return Err(ClientError::Status {
            status,
            message: error_message(body),
        });
    }
    Ok(())
}

fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .filter(|b| !b.messages.is_empty());

    match parsed {
        Some(body) => body
            .messages
            .iter()
            .map(|m| match (&m.error_code, &m.message) {
                (Some(code), Some(msg)) => format!("[{}] {}", code, msg),
                (None, Some(msg)) => msg.clone(),
                (Some(code), None) => format!("[{}]", code),
                (None, None) => "unknown error".to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        None => body.trim().chars().take(200).collect(),
    }
}

fn tracking_handle(headers: &HeaderMap) -> Option<TrackingHandle> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(TrackingHandle::new)
}

#[async_trait]
impl ResourceClient for IonosClient {
    async fn create_datacenter(&self, datacenter: &Datacenter) -> ClientResult<Submitted<Datacenter>> {
        self.submit("datacenters", datacenter).await
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ClientResult<Datacenter> {
        self.read(&format!("datacenters/{}", datacenter_id)).await
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ClientResult<Option<TrackingHandle>> {
        let path = format!("datacenters/{}", datacenter_id);
        let response = self.request(Method::DELETE, self.api_url(&path)).send().await?;

        let status = response.status().as_u16();
        let handle = tracking_handle(response.headers());
        let body = response.text().await?;
        check_status(status, &body, &path)?;

        Ok(handle)
    }

    async fn create_lan(&self, datacenter_id: &str, lan: &Lan) -> ClientResult<Submitted<Lan>> {
        self.submit(&format!("datacenters/{}/lans", datacenter_id), lan)
            .await
    }

    async fn create_server(&self, datacenter_id: &str, server: &Server) -> ClientResult<Submitted<Server>> {
        self.submit(&format!("datacenters/{}/servers", datacenter_id), server)
            .await
    }

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ClientResult<Server> {
        self.read(&format!("datacenters/{}/servers/{}", datacenter_id, server_id))
            .await
    }

    async fn get_volume(&self, datacenter_id: &str, volume_id: &str) -> ClientResult<Volume> {
        self.read(&format!("datacenters/{}/volumes/{}", datacenter_id, volume_id))
            .await
    }

    async fn list_images(&self) -> ClientResult<Vec<Image>> {
        let images: Collection<Image> = self.read("images").await?;
        Ok(images.items)
    }

    async fn create_snapshot(
        &self,
        datacenter_id: &str,
        volume_id: &str,
        name: &str,
    ) -> ClientResult<Submitted<Snapshot>> {
        let path = format!(
            "datacenters/{}/volumes/{}/create-snapshot",
            datacenter_id, volume_id
        );
        let form = SnapshotForm {
            name,
            description: "created by snapforge",
        };

        let response = self
            .request(Method::POST, self.api_url(&path))
            .form(&form)
            .send()
            .await?;
        let (snapshot, handle) = decode(response, &path).await?;
        Ok(Submitted::new(snapshot, handle))
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> ClientResult<Snapshot> {
        self.read(&format!("snapshots/{}", snapshot_id)).await
    }

    async fn get_request_status(&self, handle: &TrackingHandle) -> ClientResult<RequestStatus> {
        let response = self
            .client
            .get(self.handle_url(handle))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        let (status, _) = decode(response, handle.as_str()).await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client(base_url: &str) -> IonosClient {
        IonosClient::new(base_url, "u", "p", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_api_url() {
        let client = client("https://api.ionos.com/cloudapi/v6/");
        assert_eq!(
            client.api_url("/datacenters/dc-1/lans"),
            "https://api.ionos.com/cloudapi/v6/datacenters/dc-1/lans"
        );
    }

    #[test]
    fn test_handle_url_absolute_and_relative() {
        let client = client("https://api.ionos.com/cloudapi/v6");
        let absolute = TrackingHandle::new("https://api.ionos.com/cloudapi/v6/requests/r1/status");
        assert_eq!(client.handle_url(&absolute), absolute.as_str());

        let relative = TrackingHandle::new("requests/r1/status");
        assert_eq!(
            client.handle_url(&relative),
            "https://api.ionos.com/cloudapi/v6/requests/r1/status"
        );
    }

    #[test]
    fn test_any_status_over_299_fails() {
        assert!(check_status(200, "{}", "x").is_ok());
        assert!(check_status(202, "", "x").is_ok());

        let err = check_status(300, r#"{"id": "looks-fine"}"#, "x").unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 300, .. }));

        let err = check_status(404, "", "datacenters/dc-1").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_error_message_from_api_body() {
        let body = r#"{"httpStatus": 422, "messages": [{"errorCode": "100", "message": "[VDC-1] bad location"}]}"#;
        assert_eq!(error_message(body), "[100] [VDC-1] bad location");
        assert_eq!(error_message("  gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn test_tracking_handle_from_location_header() {
        let mut headers = HeaderMap::new();
        assert!(tracking_handle(&headers).is_none());

        headers.insert(LOCATION, HeaderValue::from_static(""));
        assert!(tracking_handle(&headers).is_none());

        headers.insert(
            LOCATION,
            HeaderValue::from_static("https://api.ionos.com/cloudapi/v6/requests/abc/status"),
        );
        assert_eq!(
            tracking_handle(&headers).unwrap().as_str(),
            "https://api.ionos.com/cloudapi/v6/requests/abc/status"
        );
    }
}

//! Handles all interactions with the display backend's REST API.
//!
//! This module wraps a cookie-aware `reqwest` client and exposes the display,
//! auth and admin endpoints. Every call goes through the same response
//! handling: a non-2xx status becomes `ApiError::Http`, a payload-level
//! `error` field becomes `ApiError::Application`, and a transport failure
//! becomes `ApiError::Network`.

use std::time::Duration;

use log::{debug, error, info, trace, warn};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::errors::ApiError;
use super::model::{
    AdminSettings, Birthday, BirthdayResponse, DisplayData, MediaItem, MediaResponse, NewsItem, NewsResponse,
    WeatherData, WeatherResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    /// Builds a client for `base_url` (e.g. `http://localhost:5000/api/v1`).
    /// Session cookies set by `/login` are kept for later calls.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        let http = Client::builder()
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ApiError::from)?;
        debug!("API client created for base URL {}", base_url);
        Ok(Self { http, base_url })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full URL for an endpoint path such as `/display`.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), endpoint)
    }

    // --- Display data ---

    pub async fn display_data(&self) -> Result<DisplayData, ApiError> {
        let data: DisplayData = self.get_json("/display").await?;
        info!(
            "Fetched display data: {} media item(s), {} birthday(s), configured: {}, version: {}",
            data.media.len(), data.birthdays.len(), data.configured, data.version
        );
        Ok(data)
    }

    pub async fn weather(&self) -> Result<Option<WeatherData>, ApiError> {
        let response: WeatherResponse = self.get_json("/weather").await?;
        Ok(response.weather)
    }

    pub async fn birthdays(&self) -> Result<Vec<Birthday>, ApiError> {
        let response: BirthdayResponse = self.get_json("/birthdays").await?;
        Ok(response.birthdays)
    }

    pub async fn media(&self) -> Result<Vec<MediaItem>, ApiError> {
        let response: MediaResponse = self.get_json("/media").await?;
        Ok(response.media)
    }

    // --- Auth ---

    /// Opens an admin session. The session cookie is stored in the client.
    pub async fn login(&self, password: &str) -> Result<Value, ApiError> {
        let url = self.endpoint_url("/login");
        debug!("Logging in at {}", url);
        let value: Value = self.send(self.http.post(&url).form(&[("password", password)]), "/login").await?;
        info!("Admin session opened.");
        Ok(value)
    }

    pub async fn logout(&self) -> Result<Value, ApiError> {
        let value: Value = self.get_json("/logout").await?;
        info!("Admin session closed.");
        Ok(value)
    }

    // --- Admin ---

    pub async fn admin_settings(&self) -> Result<AdminSettings, ApiError> {
        self.get_json("/admin/settings").await
    }

    pub async fn update_admin_settings(&self, settings: &AdminSettings) -> Result<Value, ApiError> {
        let url = self.endpoint_url("/admin/settings");
        debug!("Updating admin settings at {}: location '{}'", url, settings.weather.location);
        self.send(self.http.post(&url).json(settings), "/admin/settings").await
    }

    pub async fn admin_news(&self) -> Result<Vec<NewsItem>, ApiError> {
        let response: NewsResponse = self.get_json("/admin/news").await?;
        Ok(response.news)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint);
        self.send(self.http.get(&url), endpoint).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, endpoint: &str) -> Result<T, ApiError> {
        let response = request.send().await.map_err(|e| {
            warn!("Request to {} failed: {}", endpoint, e);
            ApiError::Network(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| format!("N/A (failed to read body: {})", e));
            error!("HTTP error from {}: {} - {}", endpoint, status, body);
            return Err(ApiError::Http { status: status.as_u16(), message: body });
        }

        let body = response.text().await.map_err(|e| {
            warn!("Failed to read body from {}: {}", endpoint, e);
            ApiError::Network(e.to_string())
        })?;
        trace!("Response body from {}: {}", endpoint, body);
        parse_api_payload(&body)
    }
}

/// Decodes a successful response body, surfacing a truthy `error` field as
/// `ApiError::Application`.
pub fn parse_api_payload<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: Value = serde_json::from_str(body)?;
    match value.get("error") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => {}
        Some(Value::String(msg)) if msg.is_empty() => {}
        Some(Value::String(msg)) => return Err(ApiError::Application(msg.clone())),
        Some(other) => return Err(ApiError::Application(other.to_string())),
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response per connection, returning the raw requests.
    async fn serve(responses: Vec<(u16, &'static str, Vec<(&'static str, &'static str)>)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/api/v1", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body, headers) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text
                            .lines()
                            .find_map(|l| l.to_lowercase().strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap()))
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length || n == 0 {
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }
                requests.push(String::from_utf8_lossy(&buf).to_string());
                let mut head = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    status,
                    body.len()
                );
                for (k, v) in headers {
                    head.push_str(&format!("{}: {}\r\n", k, v));
                }
                head.push_str("\r\n");
                socket.write_all(head.as_bytes()).await.unwrap();
                socket.write_all(body.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            requests
        });
        (base, handle)
    }

    #[test]
    fn test_error_field_becomes_application_error() {
        let err = parse_api_payload::<DisplayData>(r#"{"configured": false, "error": "Device not registered"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Application(ref m) if m == "Device not registered"));
    }

    #[test]
    fn test_falsy_error_fields_are_ignored() {
        for body in [r#"{"error": null, "media": []}"#, r#"{"error": "", "media": []}"#, r#"{"media": []}"#] {
            let resp: MediaResponse = parse_api_payload(body).unwrap();
            assert!(resp.media.is_empty());
        }
    }

    #[test]
    fn test_malformed_body_is_a_decode_error() {
        let err = parse_api_payload::<DisplayData>("<html>").unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_endpoint_urls_join_without_double_slashes() {
        let client = ApiClient::new("http://localhost:5000/api/v1/").unwrap();
        assert_eq!(client.endpoint_url("/display"), "http://localhost:5000/api/v1/display");
        assert!(matches!(ApiClient::new("not a url"), Err(ApiError::UrlParse(_))));
    }

    #[tokio::test]
    async fn test_display_data_round_trip() {
        let body = r#"{"media": [{"id": "1", "type": "image/png", "url": "u", "local_path": "/static/media/1.png",
                       "duration": 5000, "is_video": false, "width": 800, "height": 600}],
                       "birthdays": [], "version": "1.0.0", "configured": true}"#;
        let (base, server) = serve(vec![(200, body, vec![])]).await;
        let client = ApiClient::new(&base).unwrap();
        let data = client.display_data().await.unwrap();
        assert_eq!(data.media[0].id, "1");
        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("GET /api/v1/display "));
    }

    #[tokio::test]
    async fn test_display_data_accepts_play_until_end_videos() {
        let body = r#"{"media": [
                       {"id": "img", "type": "image/jpeg", "local_path": "/static/media/img.jpg",
                        "duration": 10000, "is_video": false, "width": 1920, "height": 1080},
                       {"id": "clip", "type": "video", "local_path": "/static/media/clip.mp4",
                        "duration": -1, "is_video": true, "width": 1920, "height": 1080}],
                       "birthdays": [], "version": "1.0.0", "configured": true}"#;
        let (base, _server) = serve(vec![(200, body, vec![])]).await;
        let client = ApiClient::new(&base).unwrap();
        let data = client.display_data().await.unwrap();
        assert_eq!(data.media.len(), 2);
        assert!(data.media[1].is_video);
        assert!(data.media[1].fixed_duration().is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_is_http_error() {
        let (base, _server) = serve(vec![(503, r#"{"message": "maintenance"}"#, vec![])]).await;
        let client = ApiClient::new(&base).unwrap();
        let err = client.weather().await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let client = ApiClient::new(&format!("http://{}/api/v1", addr)).unwrap();
        let err = client.display_data().await.unwrap_err();
        assert!(err.is_network(), "expected network error, got {:?}", err);
    }

    #[tokio::test]
    async fn test_login_posts_form_and_keeps_session_cookie() {
        let (base, server) = serve(vec![
            (200, r#"{"success": true}"#, vec![("Set-Cookie", "session=abc123; Path=/")]),
            (200, r#"{"news": [{"id": 1, "title": "Bem-vindos", "content": "", "media_path": null, "duration": 10, "created_at": "2026-10-01"}]}"#, vec![]),
        ])
        .await;
        let client = ApiClient::new(&base).unwrap();
        client.login("s3cret & more").await.unwrap();
        let news = client.admin_news().await.unwrap();
        assert_eq!(news[0].title, "Bem-vindos");

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /api/v1/login "));
        assert!(requests[0].to_lowercase().contains("application/x-www-form-urlencoded"));
        assert!(requests[0].ends_with("password=s3cret+%26+more"));
        assert!(requests[1].starts_with("GET /api/v1/admin/news "));
        assert!(requests[1].to_lowercase().contains("cookie: session=abc123"));
    }
}

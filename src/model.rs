//! Defines the core data structures used by the display.
//!
//! These structs are deserialized from the display backend's JSON responses and
//! serialized again when the last-known-good display data is written to the
//! on-disk cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A single image or video in the slideshow. Ordering in the fetched list
/// defines the playback sequence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MediaItem {
    pub id: String,
    /// Content type as reported by the backend, e.g. "image/jpeg" or "video".
    #[serde(rename = "type", default)]
    pub type_: String,
    /// Remote source URL of the asset.
    #[serde(default)]
    pub url: String,
    /// Path of the locally synced copy, served by the display backend.
    #[serde(default)]
    pub local_path: String,
    /// Display duration in milliseconds. The backend sends `-1` for videos
    /// that play until they end; zero or negative means no fixed duration.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MediaItem {
    /// True when the asset exactly matches a 1080p canvas and may fill it.
    pub fn is_full_hd(&self) -> bool {
        self.width == 1920 && self.height == 1080
    }

    /// The configured display time, or `None` when the item has no fixed duration.
    pub fn fixed_duration(&self) -> Option<Duration> {
        u64::try_from(self.duration).ok().filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WeatherData {
    pub city: String,
    /// Human readable condition, e.g. "céu limpo".
    pub weather: String,
    /// OpenWeatherMap icon code, e.g. "01d".
    pub icon: String,
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub rain_chance: f64,
    pub humidity: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Birthday {
    pub name: String,
    #[serde(default)]
    pub sector: String,
    /// ISO date (`YYYY-MM-DD`, optionally with a time part).
    pub date: String,
    #[serde(default)]
    pub is_today: bool,
}

/// Metadata describing the physical screen this display runs on.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    /// Device type string, e.g. "display_tv" or "vertical_tv".
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub id: String,
}

/// Everything a screen needs, fetched wholesale from `GET /display`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct DisplayData {
    #[serde(default)]
    pub weather: Option<WeatherData>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// --- Endpoint response envelopes ---

#[derive(Deserialize, Clone, Debug)]
pub struct WeatherResponse {
    pub weather: Option<WeatherData>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BirthdayResponse {
    #[serde(default)]
    pub birthdays: Vec<Birthday>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct MediaResponse {
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

// --- Admin ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_path: Option<String>,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewsResponse {
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct WeatherSettings {
    #[serde(rename = "apiKey", default)]
    pub api_key: String,
    #[serde(default)]
    pub location: String,
}

/// Admin settings as read from and written to `/admin/settings`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AdminSettings {
    pub weather: WeatherSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_data_deserializes_backend_payload() {
        let json = r#"{
            "weather": {"city": "Curitiba", "weather": "nublado", "icon": "04d",
                        "temperature": 18, "temp_min": 14, "temp_max": 21,
                        "rain_chance": 40, "humidity": 82},
            "media": [
                {"id": "a", "type": "image/jpeg", "url": "https://cdn/a.jpg",
                 "local_path": "/static/media/a.jpg", "duration": 10000,
                 "is_video": false, "width": 1920, "height": 1080},
                {"id": "b", "type": "video", "url": "https://cdn/b.mp4",
                 "local_path": "/static/media/b.mp4", "duration": 15000,
                 "is_video": true, "width": 1280, "height": 720, "title": "Promo"}
            ],
            "birthdays": [{"name": "Ana", "sector": "RH", "date": "2026-10-17", "is_today": true}],
            "device": {"type": "vertical_tv", "name": "Lobby", "description": "", "id": "dev-1"},
            "version": "2.3.1",
            "configured": true
        }"#;
        let data: DisplayData = serde_json::from_str(json).unwrap();
        assert_eq!(data.media.len(), 2);
        assert!(data.media[0].is_full_hd());
        assert!(!data.media[1].is_full_hd());
        assert_eq!(data.media[1].title.as_deref(), Some("Promo"));
        assert_eq!(data.device.as_ref().map(|d| d.type_.as_str()), Some("vertical_tv"));
        assert_eq!(data.weather.as_ref().map(|w| w.temperature), Some(18.0));
        assert!(data.configured);
        assert!(data.error.is_none());
    }

    #[test]
    fn test_play_until_end_video_duration_decodes() {
        let json = r#"{
            "media": [
                {"id": "a", "type": "image/jpeg", "local_path": "/static/media/a.jpg",
                 "duration": 8000, "is_video": false},
                {"id": "b", "type": "video", "local_path": "/static/media/b.mp4",
                 "duration": -1, "is_video": true}
            ],
            "configured": true
        }"#;
        let data: DisplayData = serde_json::from_str(json).unwrap();
        assert_eq!(data.media[0].fixed_duration(), Some(Duration::from_millis(8000)));
        assert_eq!(data.media[1].duration, -1);
        assert_eq!(data.media[1].fixed_duration(), None);

        let zero = MediaItem { duration: 0, ..data.media[0].clone() };
        assert_eq!(zero.fixed_duration(), None);
    }

    #[test]
    fn test_unconfigured_payload_uses_defaults() {
        let data: DisplayData =
            serde_json::from_str(r#"{"configured": false, "error": "Device not registered"}"#).unwrap();
        assert!(data.media.is_empty());
        assert!(data.device.is_none());
        assert_eq!(data.error.as_deref(), Some("Device not registered"));
    }

    #[test]
    fn test_admin_settings_use_camel_case_api_key() {
        let settings = AdminSettings {
            weather: WeatherSettings { api_key: "k".into(), location: "Curitiba,BR".into() },
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["weather"]["apiKey"], "k");
    }
}

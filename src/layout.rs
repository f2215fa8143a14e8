//! Chooses the screen layout from the device metadata served with the display data.

use log::{debug, warn};

use super::model::DeviceInfo;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    /// Landscape TV.
    DisplayTv,
    /// Portrait-mounted TV.
    VerticalTv,
}

impl DeviceType {
    /// Parses a backend device-type string. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "display_tv" => Some(DeviceType::DisplayTv),
            "vertical_tv" => Some(DeviceType::VerticalTv),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Header with clock and weather, media beside the birthday panel.
    Horizontal,
    /// Compact header, media stacked above the birthday panel.
    Vertical,
}

/// Maps the device type to a layout, defaulting to `Horizontal` when the
/// device is unknown, unset or of an unrecognized type.
pub fn select_layout(device: Option<&DeviceInfo>) -> Layout {
    let Some(device) = device else {
        debug!("No device info; using horizontal layout.");
        return Layout::Horizontal;
    };
    match DeviceType::parse(&device.type_) {
        Some(DeviceType::VerticalTv) => Layout::Vertical,
        Some(DeviceType::DisplayTv) => Layout::Horizontal,
        None => {
            if !device.type_.is_empty() {
                warn!("Unrecognized device type '{}' for device '{}'; using horizontal layout.", device.type_, device.id);
            }
            Layout::Horizontal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(type_: &str) -> DeviceInfo {
        DeviceInfo { type_: type_.into(), name: "Recepção".into(), description: String::new(), id: "tv-1".into() }
    }

    #[test]
    fn test_vertical_device_gets_vertical_layout() {
        assert_eq!(select_layout(Some(&device("vertical_tv"))), Layout::Vertical);
    }

    #[test]
    fn test_everything_else_defaults_to_horizontal() {
        assert_eq!(select_layout(None), Layout::Horizontal);
        assert_eq!(select_layout(Some(&device("display_tv"))), Layout::Horizontal);
        assert_eq!(select_layout(Some(&device(""))), Layout::Horizontal);
        assert_eq!(select_layout(Some(&device("hologram"))), Layout::Horizontal);
    }

    #[test]
    fn test_device_type_parsing_is_case_insensitive() {
        assert_eq!(DeviceType::parse(" Vertical_TV "), Some(DeviceType::VerticalTv));
        assert_eq!(DeviceType::parse("tablet"), None);
    }
}

//! Decides what the display presents: loading, offline, error, or content.
//!
//! Cached data always wins over an error screen. A hard error is shown only
//! when there is nothing to fall back on, the device is online, and the
//! server itself reported the problem.

use log::trace;

use super::errors::FailureKind;
use super::fetcher::QueryState;
use super::layout::{select_layout, Layout};
use super::model::DisplayData;

const NOT_CONFIGURED: &str = "Device not configured";

#[derive(Clone, Debug, PartialEq)]
pub enum ScreenView<'a> {
    Loading,
    /// No cached content and the backend cannot be reached.
    Offline,
    Error { message: String, details: Option<String> },
    Content {
        data: &'a DisplayData,
        layout: Layout,
        /// The data shown is not the result of the latest refresh attempt.
        stale: bool,
    },
}

pub fn resolve_screen(state: &QueryState<DisplayData>, is_online: bool) -> ScreenView<'_> {
    let view = match (&state.data, &state.error) {
        (Some(data), error) if !data.configured && is_online => ScreenView::Error {
            message: data.error.clone().unwrap_or_else(|| NOT_CONFIGURED.to_string()),
            details: error.as_ref().map(|e| format!("API Error: {}", e)).or_else(|| data.error.clone()),
        },
        (Some(data), error) => ScreenView::Content {
            data,
            layout: select_layout(data.device.as_ref()),
            stale: error.is_some() || !is_online,
        },
        (None, None) => ScreenView::Loading,
        (None, Some(_)) if !is_online => ScreenView::Offline,
        (None, Some(e)) if e.kind == FailureKind::Network => ScreenView::Offline,
        (None, Some(e)) => ScreenView::Error {
            message: e.message.clone(),
            details: Some(format!("API Error: {}", e)),
        },
    };
    trace!("Resolved screen (online: {}): {:?}", is_online, std::mem::discriminant(&view));
    view
}

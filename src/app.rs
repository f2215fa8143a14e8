//! The full-screen display: wires the fetcher, network monitor, slideshow
//! engine and media pipeline into an egui frame loop.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use eframe::egui;
use egui::{
    pos2, vec2, Align2, CentralPanel, Color32, ColorImage, FontId, Rect, RichText, SidePanel, TextureHandle,
    TextureOptions, TopBottomPanel, Ui,
};
use image::RgbaImage;
use log::{debug, error, info, trace, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;

use super::api_client::ApiClient;
use super::cache::DisplayCache;
use super::config::AppConfig;
use super::errors::ConfigError;
use super::fetcher::{DataFetcher, QueryState};
use super::layout::Layout;
use super::media_pipeline::{fetch_image, fetch_to_temp_file, resolve_media_url, VideoEvent, VideoPlayer};
use super::model::{Birthday, DisplayData};
use super::network::{watch_connectivity, NetworkMonitor, NetworkStatus};
use super::screen::{resolve_screen, ScreenView};
use super::slideshow::{SlideChange, SlideToken, SlideshowEngine, SlideshowTiming};
use super::state_manager::{LoadedMedia, MediaCacheManager};
use super::widgets::{
    birthday_lines, clock_text, connection_banner, version_label, weather_text, BIRTHDAYS_TITLE, ERROR_FALLBACK,
    ERROR_TITLE, LOADING, NO_BIRTHDAYS, NO_MEDIA, OFFLINE_DETAILS, OFFLINE_TITLE,
};

const VIDEO_REPAINT: Duration = Duration::from_millis(1000 / 30);
const IDLE_REPAINT: Duration = Duration::from_secs(1);
const PROBE_INTERVAL: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

const HEADER_HEIGHT: f32 = 120.0;
const SIDEBAR_WIDTH: f32 = 380.0;
const BIRTHDAY_PANEL_HEIGHT: f32 = 360.0;
const WEATHER_ICON_SIZE: f32 = 72.0;

pub struct DisplayApp {
    runtime: Handle,
    client: Option<ApiClient>,
    startup_error: Option<String>,
    display_rx: Option<watch::Receiver<QueryState<DisplayData>>>,
    network_rx: watch::Receiver<NetworkStatus>,
    engine: SlideshowEngine,
    media_cache: MediaCacheManager,
    /// Uploaded image textures, keyed like the media cache (media id or icon URL).
    textures: HashMap<String, TextureHandle>,
    /// Slide activation whose media has been requested.
    requested: Option<SlideToken>,
    video: Option<VideoPlayer>,
    video_texture: Option<TextureHandle>,
    /// Weather icon URL last requested; each icon is fetched at most once.
    icon_requested: Option<String>,
    showing_stale: bool,
}

impl DisplayApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: Result<AppConfig, ConfigError>, runtime: Handle) -> Self {
        info!("Initializing DisplayApp...");
        let (monitor, network_rx) = NetworkMonitor::new(true, Local::now());
        let mut app = Self {
            runtime,
            client: None,
            startup_error: None,
            display_rx: None,
            network_rx,
            engine: SlideshowEngine::new(SlideshowTiming::default()),
            media_cache: MediaCacheManager::new(),
            textures: HashMap::new(),
            requested: None,
            video: None,
            video_texture: None,
            icon_requested: None,
            showing_stale: false,
        };

        let config = match config {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Application starting in error state: {}", e);
                app.startup_error = Some(format!("Failed to load configuration: {}", e));
                return app;
            }
        };
        let client = match ApiClient::new(&config.api_base_url) {
            Ok(c) => c,
            Err(e) => {
                error!("Cannot create API client for '{}': {}", config.api_base_url, e);
                app.startup_error = Some(e.to_string());
                return app;
            }
        };

        app.engine = SlideshowEngine::new(config.slideshow.clone());
        debug!("Spawning connectivity probe against {}.", config.connectivity_probe);
        app.runtime.spawn(watch_connectivity(monitor, config.connectivity_probe.clone(), PROBE_INTERVAL, PROBE_TIMEOUT));
        app.display_rx = Some(spawn_display_fetcher(
            &app.runtime,
            &config,
            client.clone(),
            app.network_rx.clone(),
            cc.egui_ctx.clone(),
        ));
        app.client = Some(client);
        app
    }

    /// Feeds the latest media list to the engine; prunes media that left the list.
    fn sync_playlist(&mut self, state: &QueryState<DisplayData>, now: Instant) {
        let Some(data) = &state.data else { return };
        if !self.engine.set_media(data.media.clone(), now) {
            return;
        }
        let icon_url = data.weather.as_ref().map(|w| weather_text(w).icon_url);
        let mut keep: HashSet<&str> = data.media.iter().map(|m| m.id.as_str()).collect();
        if let Some(url) = &icon_url {
            keep.insert(url.as_str());
        }
        self.media_cache.retain_only(&keep);
        self.textures.retain(|key, _| keep.contains(key.as_str()));
        self.requested = None;
        self.stop_video();
    }

    fn on_slide_change(&mut self, change: SlideChange) {
        info!("Slide {} -> {} ({:?}).", change.from, change.to, change.reason);
        if self.video.as_ref().map_or(false, |v| v.token != change.token) {
            self.stop_video();
        }
    }

    fn stop_video(&mut self) {
        if let Some(mut player) = self.video.take() {
            info!("Stopping video playback for media '{}'.", player.media_id);
            player.stop();
        }
        self.video_texture = None;
    }

    /// Starts loading the active item's media once per activation.
    fn ensure_current_media(&mut self, ctx: &egui::Context, now: Instant) {
        let (Some(item), Some(token)) = (self.engine.current().cloned(), self.engine.active_token()) else {
            return;
        };
        if self.video.as_ref().map_or(false, |v| v.token != token) {
            self.stop_video();
        }
        if self.requested == Some(token) {
            return;
        }
        self.requested = Some(token);
        let Some(client) = &self.client else { return };

        let url = match resolve_media_url(client.base_url(), &item) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot load media '{}': {}", item.id, e);
                self.engine.on_media_error(token, now);
                return;
            }
        };
        let Some(sink) = self.media_cache.begin_load(&item.id) else { return };
        info!("Loading {} '{}' from {}", if item.is_video { "video" } else { "image" }, item.id, url);
        let http = client.http().clone();
        let ctx = ctx.clone();
        let is_video = item.is_video;
        self.runtime.spawn(async move {
            let result = if is_video {
                fetch_to_temp_file(&http, &url).await.map(LoadedMedia::VideoFile)
            } else {
                fetch_image(&http, &url).await.map(|img| LoadedMedia::Image(Arc::new(img)))
            };
            sink.complete(result);
            ctx.request_repaint();
        });
    }

    fn ensure_weather_icon(&mut self, ctx: &egui::Context, data: &DisplayData) {
        let (Some(weather), Some(client)) = (&data.weather, &self.client) else { return };
        if weather.icon.is_empty() {
            return;
        }
        let url = weather_text(weather).icon_url;
        if self.icon_requested.as_deref() == Some(url.as_str()) {
            return;
        }
        self.icon_requested = Some(url.clone());
        let Some(sink) = self.media_cache.begin_load(&url) else { return };
        let http = client.http().clone();
        let ctx = ctx.clone();
        self.runtime.spawn(async move {
            let result = fetch_image(&http, &url).await.map(|img| LoadedMedia::Image(Arc::new(img)));
            sink.complete(result);
            ctx.request_repaint();
        });
    }

    fn drain_media_loads(&mut self, ctx: &egui::Context, now: Instant) {
        let active = self.engine.current().map(|m| m.id.clone());
        let token = self.engine.active_token();
        for (id, result) in self.media_cache.drain_completed() {
            let active_token = token.filter(|_| active.as_deref() == Some(id.as_str()));
            match result {
                Ok(LoadedMedia::Image(img)) => {
                    debug!("Uploading texture for '{}' ({}x{}).", id, img.width(), img.height());
                    let texture = ctx.load_texture(format!("media-{}", id), to_color_image(&img), TextureOptions::LINEAR);
                    self.textures.insert(id, texture);
                }
                Ok(LoadedMedia::VideoFile(file)) => match active_token {
                    Some(token) => match VideoPlayer::start(id.clone(), token, file) {
                        Ok(player) => {
                            self.engine.on_video_started(token, now);
                            self.video = Some(player);
                            self.video_texture = None;
                        }
                        Err(e) => {
                            error!("Failed to start video '{}': {}", id, e);
                            self.engine.on_media_error(token, now);
                        }
                    },
                    None => debug!("Discarding downloaded video '{}': no longer on screen.", id),
                },
                Err(e) => {
                    warn!("Failed to load media '{}': {}", id, e);
                    if let Some(token) = active_token {
                        self.engine.on_media_error(token, now);
                    }
                }
            }
        }
    }

    fn pump_video_events(&mut self, ctx: &egui::Context, now: Instant) {
        let Some(player) = &self.video else { return };
        let token = player.token;
        let mut latest_frame = None;
        let mut events = Vec::new();
        while let Some(event) = player.try_next_event() {
            match event {
                VideoEvent::Frame(frame) => latest_frame = Some(frame),
                other => events.push(other),
            }
        }

        if let Some(frame) = latest_frame {
            let image = ColorImage::from_rgba_unmultiplied([frame.width as usize, frame.height as usize], &frame.rgba);
            match &mut self.video_texture {
                Some(texture) => texture.set(image, TextureOptions::LINEAR),
                None => self.video_texture = Some(ctx.load_texture("video-frame", image, TextureOptions::LINEAR)),
            }
        }

        for event in events {
            match event {
                VideoEvent::Metadata(duration) => {
                    debug!("Video metadata: duration {:?}", duration);
                    self.engine.on_video_metadata(token, duration, now);
                }
                VideoEvent::Ended => {
                    if let Some(change) = self.engine.on_video_ended(token, now) {
                        self.on_slide_change(change);
                    }
                }
                VideoEvent::Error(message) => {
                    error!("Video playback error: {}", message);
                    self.engine.on_media_error(token, now);
                }
                VideoEvent::Frame(_) => {}
            }
        }
    }

    fn repaint_delay(&self, now: Instant) -> Duration {
        if self.video.is_some() || self.engine.is_transitioning(now) {
            return VIDEO_REPAINT;
        }
        self.engine
            .next_deadline()
            .map_or(IDLE_REPAINT, |deadline| deadline.saturating_duration_since(now).min(IDLE_REPAINT))
    }

    fn render_content(&self, ctx: &egui::Context, data: &DisplayData, layout: Layout, network: &NetworkStatus, now: Instant) {
        TopBottomPanel::top("header").exact_height(HEADER_HEIGHT).show(ctx, |ui| self.draw_header(ui, data));
        TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.label(RichText::new(version_label(&data.version)).small().weak());
        });
        match layout {
            Layout::Horizontal => {
                SidePanel::right("birthdays")
                    .exact_width(SIDEBAR_WIDTH)
                    .resizable(false)
                    .show(ctx, |ui| draw_birthdays(ui, &data.birthdays));
            }
            Layout::Vertical => {
                TopBottomPanel::bottom("birthdays")
                    .exact_height(BIRTHDAY_PANEL_HEIGHT)
                    .resizable(false)
                    .show(ctx, |ui| draw_birthdays(ui, &data.birthdays));
            }
        }
        CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| self.draw_media(ui, now));

        if let Some(banner) = connection_banner(network) {
            egui::Area::new(egui::Id::new("connection-banner"))
                .anchor(Align2::RIGHT_TOP, vec2(-16.0, 16.0))
                .show(ctx, |ui| {
                    egui::Frame::popup(ui.style()).fill(Color32::from_rgb(180, 40, 40)).show(ui, |ui| {
                        ui.label(RichText::new(&banner.title).size(20.0).strong().color(Color32::WHITE));
                        if let Some(since) = &banner.since {
                            ui.label(RichText::new(since).color(Color32::WHITE));
                        }
                    });
                });
        }
    }

    fn draw_header(&self, ui: &mut Ui, data: &DisplayData) {
        let clock = clock_text(&Local::now());
        ui.horizontal_centered(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new(&clock.time).size(56.0).strong());
                ui.label(RichText::new(format!("{}, {}", clock.weekday, clock.date)).size(22.0));
            });
            let Some(weather) = &data.weather else { return };
            let text = weather_text(weather);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if let Some(icon) = self.textures.get(&text.icon_url) {
                    ui.image((icon.id(), vec2(WEATHER_ICON_SIZE, WEATHER_ICON_SIZE)));
                }
                ui.vertical(|ui| {
                    ui.label(RichText::new(&text.temperature).size(44.0).strong());
                    ui.label(format!("{} · {}", text.city, text.condition));
                    ui.label(format!("{}  {}", text.max, text.min));
                    ui.label(format!("{}  {}", text.rain, text.humidity));
                });
            });
        });
    }

    fn draw_media(&self, ui: &mut Ui, now: Instant) {
        let Some(item) = self.engine.current() else {
            ui.centered_and_justified(|ui| {
                ui.label(RichText::new(NO_MEDIA).size(28.0).color(Color32::GRAY));
            });
            return;
        };
        let texture = if item.is_video { self.video_texture.as_ref() } else { self.textures.get(&item.id) };
        let Some(texture) = texture else {
            ui.centered_and_justified(|ui| {
                ui.spinner();
            });
            return;
        };

        let size = texture.size_vec2();
        let area = ui.max_rect();
        // Media authored at exactly 1920x1080 fills the area; anything else is letterboxed.
        let (draw_rect, uv) = if item.is_full_hd() {
            (area, cover_uv(size.x, size.y, area))
        } else {
            (calculate_draw_rect(size.x, size.y, area), Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)))
        };
        let alpha = (self.engine.transition_progress(now).clamp(0.0, 1.0) * 255.0) as u8;
        ui.painter().image(texture.id(), draw_rect, uv, Color32::from_white_alpha(alpha));

        if let Some(title) = item.title.as_deref().filter(|t| !t.is_empty()) {
            ui.painter().text(
                pos2(draw_rect.left() + 24.0, draw_rect.bottom() - 24.0),
                Align2::LEFT_BOTTOM,
                title,
                FontId::proportional(28.0),
                Color32::WHITE,
            );
        }
        trace!("Drew media '{}' at {:?} (alpha {}).", item.id, draw_rect, alpha);
    }
}

impl eframe::App for DisplayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        let state = self.display_rx.as_ref().map(|rx| rx.borrow().clone());
        let network = self.network_rx.borrow().clone();

        if let Some(state) = &state {
            self.sync_playlist(state, now);
            if let Some(data) = &state.data {
                self.ensure_weather_icon(ctx, data);
            }
        }
        self.drain_media_loads(ctx, now);
        self.pump_video_events(ctx, now);
        if let Some(change) = self.engine.poll(now) {
            self.on_slide_change(change);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::ArrowRight)) {
            if let Some(change) = self.engine.advance(now) {
                self.on_slide_change(change);
            }
        }
        self.ensure_current_media(ctx, now);

        if let Some(message) = &self.startup_error {
            render_message(ctx, ERROR_TITLE, Some(message), Color32::LIGHT_RED);
            return;
        }
        let Some(state) = &state else {
            render_message(ctx, LOADING, None, Color32::WHITE);
            return;
        };

        match resolve_screen(state, network.is_online) {
            ScreenView::Loading => render_message(ctx, LOADING, None, Color32::WHITE),
            ScreenView::Offline => render_message(ctx, OFFLINE_TITLE, Some(OFFLINE_DETAILS), Color32::WHITE),
            ScreenView::Error { message, details } => {
                let message = if message.is_empty() { ERROR_FALLBACK.to_string() } else { message };
                let text = match details {
                    Some(details) if details != message => format!("{}\n\n{}", message, details),
                    _ => message,
                };
                render_message(ctx, ERROR_TITLE, Some(&text), Color32::LIGHT_RED);
            }
            ScreenView::Content { data, layout, stale } => {
                if stale != self.showing_stale {
                    info!("Display is now showing {} data.", if stale { "stale cached" } else { "fresh" });
                    self.showing_stale = stale;
                }
                self.render_content(ctx, data, layout, &network, now);
            }
        }
        ctx.request_repaint_after(self.repaint_delay(now));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("DisplayApp on_exit called. Stopping slideshow and video.");
        self.engine.dispose();
        self.stop_video();
    }
}

/// Creates the `/display` fetcher, seeded from the disk cache, and starts it.
fn spawn_display_fetcher(
    runtime: &Handle,
    config: &AppConfig,
    client: ApiClient,
    network: watch::Receiver<NetworkStatus>,
    ctx: egui::Context,
) -> watch::Receiver<QueryState<DisplayData>> {
    let cache = config.cache_path.clone().map(DisplayCache::new);
    let initial = cache
        .as_ref()
        .and_then(DisplayCache::load_or_discard)
        .map(QueryState::seeded)
        .unwrap_or_default();
    let (fetcher, state_rx) = DataFetcher::new("display", config.display_refresh.clone(), initial);

    let fetch = move || {
        let client = client.clone();
        async move { client.display_data().await }
    };
    let on_success = move |data: &DisplayData| {
        if let Some(cache) = &cache {
            if let Err(e) = cache.store(data) {
                warn!("Failed to persist display cache to {:?}: {}", cache.path(), e);
            }
        }
        ctx.request_repaint();
    };
    runtime.spawn(fetcher.run(fetch, Some(network), on_success));
    state_rx
}

fn render_message(ctx: &egui::Context, title: &str, details: Option<&str>, color: Color32) {
    CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() / 3.0);
            ui.label(RichText::new(title).size(42.0).strong().color(color));
            if let Some(details) = details {
                ui.add_space(12.0);
                ui.label(RichText::new(details).size(24.0));
            }
        });
    });
}

fn draw_birthdays(ui: &mut Ui, birthdays: &[Birthday]) {
    ui.add_space(8.0);
    ui.heading(BIRTHDAYS_TITLE);
    ui.separator();
    let lines = birthday_lines(birthdays);
    if lines.is_empty() {
        ui.label(RichText::new(NO_BIRTHDAYS).weak());
        return;
    }
    for line in lines {
        ui.horizontal(|ui| {
            ui.vertical(|ui| {
                ui.label(RichText::new(&line.name).size(20.0).strong());
                ui.label(RichText::new(&line.sector).weak());
            });
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let when = RichText::new(&line.when).size(18.0);
                ui.label(if line.is_today { when.color(Color32::GOLD).strong() } else { when });
            });
        });
        ui.add_space(8.0);
    }
}

fn to_color_image(img: &RgbaImage) -> ColorImage {
    ColorImage::from_rgba_unmultiplied([img.width() as usize, img.height() as usize], img.as_raw())
}

/// Largest rect with the media's aspect ratio that fits, centered, in `available_rect`.
fn calculate_draw_rect(media_width: f32, media_height: f32, available_rect: Rect) -> Rect {
    if media_width <= 0.0 || media_height <= 0.0 {
        return available_rect;
    }
    let aspect_ratio = media_width / media_height;
    let mut draw_width = available_rect.width();
    let mut draw_height = available_rect.width() / aspect_ratio;
    if draw_height > available_rect.height() {
        draw_height = available_rect.height();
        draw_width = available_rect.height() * aspect_ratio;
    }
    Rect::from_center_size(available_rect.center(), vec2(draw_width, draw_height))
}

/// Texture coordinates that crop the media to fill `area` without distortion.
fn cover_uv(media_width: f32, media_height: f32, area: Rect) -> Rect {
    let full = Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0));
    if media_width <= 0.0 || media_height <= 0.0 || area.height() <= 0.0 {
        return full;
    }
    let media_aspect = media_width / media_height;
    let area_aspect = area.width() / area.height();
    if media_aspect > area_aspect {
        let visible = area_aspect / media_aspect;
        Rect::from_min_max(pos2((1.0 - visible) / 2.0, 0.0), pos2((1.0 + visible) / 2.0, 1.0))
    } else {
        let visible = media_aspect / area_aspect;
        Rect::from_min_max(pos2(0.0, (1.0 - visible) / 2.0), pos2(1.0, (1.0 + visible) / 2.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Rect {
        Rect::from_min_size(pos2(0.0, 0.0), vec2(1920.0, 1080.0))
    }

    #[test]
    fn test_wide_media_is_letterboxed() {
        let rect = calculate_draw_rect(1920.0, 540.0, screen());
        assert_eq!(rect.width(), 1920.0);
        assert_eq!(rect.height(), 540.0);
        assert_eq!(rect.center(), screen().center());
    }

    #[test]
    fn test_tall_media_is_pillarboxed() {
        let rect = calculate_draw_rect(1080.0, 1920.0, screen());
        assert_eq!(rect.height(), 1080.0);
        assert!((rect.width() - 607.5).abs() < 0.01);
    }

    #[test]
    fn test_degenerate_media_fills_area() {
        assert_eq!(calculate_draw_rect(0.0, 100.0, screen()), screen());
    }

    #[test]
    fn test_cover_crops_the_overflowing_axis() {
        let same = cover_uv(1920.0, 1080.0, screen());
        assert_eq!(same, Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)));

        let narrower_area = Rect::from_min_size(pos2(0.0, 0.0), vec2(960.0, 1080.0));
        let uv = cover_uv(1920.0, 1080.0, narrower_area);
        assert!((uv.min.x - 0.25).abs() < 1e-4 && (uv.max.x - 0.75).abs() < 1e-4);
        assert_eq!((uv.min.y, uv.max.y), (0.0, 1.0));
    }

    #[test]
    fn test_color_image_keeps_dimensions() {
        let img = RgbaImage::from_pixel(4, 3, image::Rgba([255, 0, 0, 255]));
        let color = to_color_image(&img);
        assert_eq!(color.size, [4, 3]);
        assert_eq!(color.pixels[0], Color32::from_rgb(255, 0, 0));
    }
}

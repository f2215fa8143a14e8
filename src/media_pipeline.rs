//! Handles media fetching, decoding and video playback.
//!
//! This module is responsible for:
//! - Resolving where a media item is served from.
//! - Fetching and decoding images.
//! - Streaming videos into temporary files.
//! - Decoding videos on a worker thread (`video` feature) and reporting
//!   playback events that drive the slideshow engine.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, error, info, trace, warn};
use reqwest::Client;
use tempfile::NamedTempFile;
use tokio_stream::StreamExt;
use url::Url;

use super::errors::MediaError;
use super::model::MediaItem;
use super::slideshow::SlideToken;

/// Decoded frames buffered between the decoder thread and the UI.
const FRAME_QUEUE_DEPTH: usize = 5;
/// Overrides the client's short request timeout for whole-file video downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Where to load `item` from: the locally synced copy served by the display
/// backend if present, otherwise the remote URL.
pub fn resolve_media_url(base: &Url, item: &MediaItem) -> Result<String, MediaError> {
    if !item.local_path.is_empty() {
        if let Ok(absolute) = Url::parse(&item.local_path) {
            return Ok(absolute.to_string());
        }
        return base
            .join(&item.local_path)
            .map(|u| u.to_string())
            .map_err(|e| MediaError::Generic(format!("Bad local_path '{}' for media '{}': {}", item.local_path, item.id, e)));
    }
    if !item.url.is_empty() {
        return Ok(item.url.clone());
    }
    Err(MediaError::MissingSource(item.id.clone()))
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, MediaError> {
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Fetches an image and decodes it to RGBA.
#[must_use = "fetching an image can fail; the Result must be handled"]
pub async fn fetch_image(client: &Client, url: &str) -> Result<RgbaImage, MediaError> {
    debug!("Fetching image: {}", url);
    let response = client.get(url).send().await.map_err(|e| {
        error!("Request error fetching image '{}': {:?}", url, e);
        MediaError::Download(e)
    })?;
    let response = response.error_for_status().map_err(|e| {
        error!("HTTP error {} fetching image '{}'", e.status().unwrap_or_default(), url);
        MediaError::Download(e)
    })?;
    let image_bytes = response.bytes().await.map_err(|e| {
        error!("Error reading image bytes for '{}': {:?}", url, e);
        MediaError::Download(e)
    })?;

    trace!("Decoding image: {}", url);
    let img = decode_image(&image_bytes).map_err(|e| {
        error!("Error decoding image '{}': {}", url, e);
        e
    })?;
    info!("Fetched and decoded image {} ({}x{})", url, img.width(), img.height());
    Ok(img)
}

/// Streams a media asset into a temporary file.
#[must_use = "fetching a video can fail; the Result must be handled"]
pub async fn fetch_to_temp_file(client: &Client, url: &str) -> Result<NamedTempFile, MediaError> {
    debug!("Fetching '{}' to temp file", url);
    let response = client.get(url).timeout(DOWNLOAD_TIMEOUT).send().await?.error_for_status()?;

    let mut temp_file = NamedTempFile::new()?;
    trace!("Created temp file for '{}' at: {:?}", url, temp_file.path());
    let mut stream = response.bytes_stream();
    while let Some(item) = stream.next().await {
        let chunk = item.map_err(|e| {
            error!("Stream error while downloading '{}': {:?}", url, e);
            MediaError::Download(e)
        })?;
        temp_file.write_all(&chunk)?;
    }
    temp_file.flush()?;
    info!("Fetched '{}' to temp file {:?}", url, temp_file.path());
    Ok(temp_file)
}

/// One decoded RGBA video frame, rows packed without padding.
#[derive(Debug)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug)]
pub enum VideoEvent {
    /// Container opened; carries the media duration when it is known.
    Metadata(Option<Duration>),
    Frame(Arc<VideoFrame>),
    Ended,
    Error(String),
}

/// Prepares the video backend. Call once at startup.
pub fn init() -> Result<(), MediaError> {
    #[cfg(feature = "video")]
    {
        ffmpeg_next::init()?;
        debug!("FFmpeg initialized.");
    }
    Ok(())
}

/// Playback state of the video currently on screen.
#[derive(Debug)]
pub struct VideoPlayer {
    pub media_id: String,
    pub token: SlideToken,
    events: Option<std_mpsc::Receiver<VideoEvent>>,
    stop_flag: Arc<AtomicBool>,
    decoder_thread_handle: Option<thread::JoinHandle<()>>,
    /// Keeps the downloaded file alive until playback is torn down.
    _temp_file: NamedTempFile,
}

impl VideoPlayer {
    /// Starts decoding `temp_file` on a worker thread.
    pub fn start(media_id: String, token: SlideToken, temp_file: NamedTempFile) -> Result<Self, MediaError> {
        let (tx, rx) = std_mpsc::sync_channel(FRAME_QUEUE_DEPTH);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let handle = spawn_decoder(media_id.clone(), temp_file.path().to_path_buf(), tx, stop_flag.clone())?;
        info!("Started video playback for media '{}'", media_id);
        Ok(Self {
            media_id,
            token,
            events: Some(rx),
            stop_flag,
            decoder_thread_handle: Some(handle),
            _temp_file: temp_file,
        })
    }

    /// Next pending playback event, if any.
    pub fn try_next_event(&self) -> Option<VideoEvent> {
        self.events.as_ref()?.try_recv().ok()
    }

    /// Signals the decoder to stop and joins it.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        // Dropping the receiver unblocks a decoder waiting on a full queue.
        self.events = None;
        if let Some(handle) = self.decoder_thread_handle.take() {
            debug!("Joining video decoder thread for {}", self.media_id);
            if let Err(e) = handle.join() {
                error!("Error joining video decoder thread for {}: {:?}", self.media_id, e);
            }
        }
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(not(feature = "video"))]
fn spawn_decoder(
    media_id: String,
    _path: std::path::PathBuf,
    _tx: std_mpsc::SyncSender<VideoEvent>,
    _stop_flag: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, MediaError> {
    warn!("Cannot play video '{}': built without the `video` feature.", media_id);
    Err(MediaError::UnsupportedFormat("video playback requires the `video` feature".to_string()))
}

#[cfg(feature = "video")]
fn spawn_decoder(
    media_id: String,
    path: std::path::PathBuf,
    tx: std_mpsc::SyncSender<VideoEvent>,
    stop_flag: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, MediaError> {
    let handle = thread::Builder::new()
        .name(format!("video-{}", media_id))
        .spawn(move || {
            match ffmpeg_decoder::decode(&path, &tx, &stop_flag) {
                Ok(()) => debug!("Video decoding thread for {} finished.", media_id),
                Err(e) => {
                    error!("Video decoding for {} failed: {}", media_id, e);
                    let _ = tx.send(VideoEvent::Error(e.to_string()));
                }
            }
        })?;
    Ok(handle)
}

#[cfg(feature = "video")]
mod ffmpeg_decoder {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::SyncSender;
    use std::sync::Arc;
    use std::time::Duration;

    use ffmpeg_next as ffmpeg;
    use ffmpeg::format::Pixel;
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{context::Context, flag::Flags};
    use ffmpeg::util::frame::video::Video;
    use log::{trace, warn};

    use super::{VideoEvent, VideoFrame};
    use crate::errors::MediaError;

    const FALLBACK_FPS: f64 = 30.0;

    /// Decodes until EOF or until `stop_flag` is set. Returns `Ok` when the UI
    /// side hung up.
    pub(super) fn decode(path: &Path, tx: &SyncSender<VideoEvent>, stop_flag: &AtomicBool) -> Result<(), MediaError> {
        let mut ictx = ffmpeg::format::input(&path)?;

        // Container duration is in AV_TIME_BASE units (microseconds).
        let duration = u64::try_from(ictx.duration()).ok().filter(|d| *d > 0).map(Duration::from_micros);
        if tx.send(VideoEvent::Metadata(duration)).is_err() {
            return Ok(());
        }

        let input_stream = ictx.streams().best(Type::Video).ok_or(ffmpeg::Error::StreamNotFound)?;
        let video_stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            f64::from(rate.numerator()) / f64::from(rate.denominator())
        } else {
            FALLBACK_FPS
        };
        let frame_interval = Duration::from_secs_f64(1.0 / fps);

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())?;
        let mut decoder = context_decoder.decoder().video()?;
        let mut scaler = Context::get(
            decoder.format(), decoder.width(), decoder.height(),
            Pixel::RGBA, decoder.width(), decoder.height(), Flags::BILINEAR,
        )?;
        trace!("Decoder ready: {}x{} at {:.2} fps", decoder.width(), decoder.height(), fps);

        let mut decoded = Video::empty();
        for (stream, packet) in ictx.packets() {
            if stop_flag.load(Ordering::SeqCst) {
                return Ok(());
            }
            if stream.index() != video_stream_index {
                continue;
            }
            decoder.send_packet(&packet)?;
            while decoder.receive_frame(&mut decoded).is_ok() {
                if !emit(&mut scaler, &decoded, tx, frame_interval)? {
                    return Ok(());
                }
            }
        }
        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            if !emit(&mut scaler, &decoded, tx, frame_interval)? {
                return Ok(());
            }
        }
        if tx.send(VideoEvent::Ended).is_err() {
            warn!("Video ended but the player is gone.");
        }
        Ok(())
    }

    /// Scales one frame to RGBA and sends it, pacing to the stream rate.
    /// Returns `false` when the receiver is gone.
    fn emit(scaler: &mut Context, decoded: &Video, tx: &SyncSender<VideoEvent>, frame_interval: Duration) -> Result<bool, MediaError> {
        let mut rgba = Video::empty();
        scaler.run(decoded, &mut rgba)?;
        let (width, height) = (rgba.width(), rgba.height());
        let stride = rgba.stride(0);
        let row_len = width as usize * 4;
        let data = rgba.data(0);
        let mut packed = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            packed.extend_from_slice(&data[row * stride..row * stride + row_len]);
        }
        if tx.send(VideoEvent::Frame(Arc::new(VideoFrame { width, height, rgba: packed }))).is_err() {
            return Ok(false);
        }
        std::thread::sleep(frame_interval);
        Ok(true)
    }
}

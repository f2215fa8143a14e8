//! Slideshow timing and transition state machine.
//!
//! `SlideshowEngine` decides which media item is visible, for how long, and
//! when to move on. It owns its countdown and transition lock explicitly and
//! never reads the clock itself: every call takes the current `Instant`, and
//! the UI frame loop calls [`SlideshowEngine::poll`] to fire due countdowns.
//!
//! Playback events (video ended, metadata, load errors) are addressed with a
//! [`SlideToken`]. A token from a replaced list or from an item that is no
//! longer active is ignored, so a late callback can never advance the wrong
//! slide.

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::model::MediaItem;

/// How video items are timed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimingMode {
    /// Videos advance when playback reports completion, with a safety timer
    /// derived from the reported media duration.
    VideoEvents,
    /// Every item, video or not, advances on its configured duration.
    SimpleTimer,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SlideshowTiming {
    pub mode: TimingMode,
    /// Length of the cross-fade; advances are refused while it runs.
    pub transition: Duration,
    /// Subtracted from an image's duration to account for the fade.
    pub image_transition_allowance: Duration,
    /// Lower bound for any fixed countdown.
    pub min_image_duration: Duration,
    /// Delay before moving past an item that failed to load or play.
    pub error_grace: Duration,
    /// Added to a video's reported duration before the safety advance fires.
    pub video_safety_buffer: Duration,
    /// How long a video may take to download and start playing.
    pub video_load_timeout: Duration,
}

impl Default for SlideshowTiming {
    fn default() -> Self {
        Self {
            mode: TimingMode::VideoEvents,
            transition: Duration::from_millis(1000),
            image_transition_allowance: Duration::from_millis(1000),
            min_image_duration: Duration::from_millis(1000),
            error_grace: Duration::from_millis(2000),
            video_safety_buffer: Duration::from_millis(500),
            video_load_timeout: Duration::from_secs(120),
        }
    }
}

/// Identifies one activation of one slide. Every advance, list replacement
/// and dispose starts a new activation, so tokens never repeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlideToken {
    activation: u64,
    index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceReason {
    /// Fixed display time elapsed.
    Timer,
    VideoEnded,
    /// The video ran past its reported duration without an ended event.
    VideoSafetyTimer,
    /// The video never started, or started without reporting a duration in time.
    StallFallback,
    MediaError,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlideChange {
    pub from: usize,
    pub to: usize,
    pub token: SlideToken,
    pub reason: AdvanceReason,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CountdownKind {
    Display,
    VideoStall,
    VideoSafety,
    ErrorGrace,
}

impl CountdownKind {
    fn reason(self) -> AdvanceReason {
        match self {
            CountdownKind::Display => AdvanceReason::Timer,
            CountdownKind::VideoStall => AdvanceReason::StallFallback,
            CountdownKind::VideoSafety => AdvanceReason::VideoSafetyTimer,
            CountdownKind::ErrorGrace => AdvanceReason::MediaError,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Countdown {
    deadline: Instant,
    kind: CountdownKind,
}

#[derive(Debug)]
pub struct SlideshowEngine {
    timing: SlideshowTiming,
    media: Vec<MediaItem>,
    current_index: usize,
    activation: u64,
    transition_until: Option<Instant>,
    countdown: Option<Countdown>,
    disposed: bool,
}

impl SlideshowEngine {
    pub fn new(timing: SlideshowTiming) -> Self {
        debug!("Initializing SlideshowEngine with {:?}", timing);
        Self {
            timing,
            media: Vec::new(),
            current_index: 0,
            activation: 0,
            transition_until: None,
            countdown: None,
            disposed: false,
        }
    }

    pub fn current(&self) -> Option<&MediaItem> {
        self.media.get(self.current_index)
    }

    /// Token for the slide currently on screen, if any.
    pub fn active_token(&self) -> Option<SlideToken> {
        if self.disposed || self.media.is_empty() {
            return None;
        }
        Some(SlideToken { activation: self.activation, index: self.current_index })
    }

    pub fn is_transitioning(&self, now: Instant) -> bool {
        self.transition_until.map_or(false, |until| now < until)
    }

    /// Fade progress of the active slide, `0.0` right after an advance, `1.0` when settled.
    pub fn transition_progress(&self, now: Instant) -> f32 {
        match self.transition_until {
            Some(until) if now < until && !self.timing.transition.is_zero() => {
                let remaining = until.duration_since(now).as_secs_f32();
                1.0 - remaining / self.timing.transition.as_secs_f32()
            }
            _ => 1.0,
        }
    }

    /// When the engine next needs to be polled, for repaint scheduling.
    pub fn next_deadline(&self) -> Option<Instant> {
        let countdown = self.countdown.map(|c| c.deadline);
        match (countdown, self.transition_until) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Replaces the media list.
    ///
    /// An identical list keeps the show running untouched. Any other list
    /// cancels the pending countdown, invalidates outstanding tokens, and
    /// restarts from the first item. Returns whether the list was replaced.
    pub fn set_media(&mut self, media: Vec<MediaItem>, now: Instant) -> bool {
        if self.disposed {
            warn!("set_media called on a disposed SlideshowEngine, ignoring.");
            return false;
        }
        if media == self.media {
            trace!("Media list unchanged ({} items), keeping slideshow state.", media.len());
            return false;
        }
        info!("Media list replaced: {} -> {} items.", self.media.len(), media.len());
        self.media = media;
        self.activation += 1;
        self.current_index = 0;
        self.transition_until = None;
        self.countdown = None;
        self.schedule_current(now);
        true
    }

    /// Moves to the next item on request, unless a transition is running or
    /// there is nothing to move to.
    pub fn advance(&mut self, now: Instant) -> Option<SlideChange> {
        self.advance_with(now, AdvanceReason::Manual)
    }

    /// Playback of the active video finished.
    pub fn on_video_ended(&mut self, token: SlideToken, now: Instant) -> Option<SlideChange> {
        if !self.is_active(token) {
            debug!("Ignoring video ended event for inactive slide {:?}.", token);
            return None;
        }
        if !self.plays_to_end(token) {
            trace!("Video ended for slide {} in simple timer mode; timer governs.", token.index);
            return None;
        }
        debug!("Video ended for slide {}.", token.index);
        self.advance_with(now, AdvanceReason::VideoEnded)
    }

    /// The active video finished loading and playback began. Replaces the
    /// load timeout with the stall fallback, which runs from now.
    pub fn on_video_started(&mut self, token: SlideToken, now: Instant) {
        if !self.is_active(token) || !self.plays_to_end(token) {
            return;
        }
        let fallback = match self.media[token.index].fixed_duration() {
            Some(configured) => configured.max(self.timing.min_image_duration) + self.timing.video_safety_buffer,
            None => self.timing.video_load_timeout,
        };
        debug!("Video started for slide {}; stall fallback in {:?}.", token.index, fallback);
        self.arm(now + fallback, CountdownKind::VideoStall);
    }

    /// The active video reported its length. A finite, positive duration arms
    /// the safety advance at `duration + video_safety_buffer`.
    pub fn on_video_metadata(&mut self, token: SlideToken, media_duration: Option<Duration>, now: Instant) {
        if !self.is_active(token) || !self.plays_to_end(token) {
            return;
        }
        match media_duration.filter(|d| !d.is_zero()) {
            Some(d) => {
                debug!("Video metadata for slide {}: duration {:?}. Arming safety timer.", token.index, d);
                self.arm(now + d + self.timing.video_safety_buffer, CountdownKind::VideoSafety);
            }
            None => debug!("Video metadata for slide {} has no usable duration; keeping stall fallback.", token.index),
        }
    }

    /// The active item failed to load or play. An advance is scheduled after
    /// the grace period, replacing whatever countdown was pending.
    pub fn on_media_error(&mut self, token: SlideToken, now: Instant) {
        if !self.is_active(token) {
            debug!("Ignoring media error for inactive slide {:?}.", token);
            return;
        }
        warn!("Media error on slide {}; advancing in {:?}.", token.index, self.timing.error_grace);
        self.arm(now + self.timing.error_grace, CountdownKind::ErrorGrace);
    }

    /// Fires the pending countdown if it is due.
    ///
    /// A countdown that comes due during a transition is deferred to the end
    /// of the transition rather than dropped.
    pub fn poll(&mut self, now: Instant) -> Option<SlideChange> {
        if self.disposed {
            return None;
        }
        if self.transition_until.map_or(false, |until| now >= until) {
            trace!("Transition lock released.");
            self.transition_until = None;
        }
        let countdown = self.countdown?;
        if now < countdown.deadline {
            return None;
        }
        if let Some(until) = self.transition_until {
            trace!("Countdown {:?} due during transition, deferring.", countdown.kind);
            self.countdown = Some(Countdown { deadline: until, kind: countdown.kind });
            return None;
        }
        self.countdown = None;
        self.advance_with(now, countdown.kind.reason())
    }

    /// Cancels all pending work. The engine ignores every call afterwards.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        info!("Disposing SlideshowEngine ({} items).", self.media.len());
        self.disposed = true;
        self.countdown = None;
        self.transition_until = None;
        self.media.clear();
        self.current_index = 0;
        self.activation += 1;
    }

    fn is_active(&self, token: SlideToken) -> bool {
        self.active_token() == Some(token)
    }

    /// Whether the item behind `token` is a video timed by playback events.
    /// Videos without a fixed duration always are, whatever the mode.
    fn plays_to_end(&self, token: SlideToken) -> bool {
        self.media.get(token.index).map_or(false, |item| self.is_event_timed(item))
    }

    fn is_event_timed(&self, item: &MediaItem) -> bool {
        item.is_video && (self.timing.mode == TimingMode::VideoEvents || item.fixed_duration().is_none())
    }

    fn advance_with(&mut self, now: Instant, reason: AdvanceReason) -> Option<SlideChange> {
        if self.disposed || self.media.len() < 2 {
            trace!("Advance ({:?}) ignored: {} item(s).", reason, self.media.len());
            return None;
        }
        if self.is_transitioning(now) {
            debug!("Advance ({:?}) ignored: transition already in progress.", reason);
            return None;
        }
        let from = self.current_index;
        self.current_index = (self.current_index + 1) % self.media.len();
        self.transition_until = Some(now + self.timing.transition);
        self.activation += 1;
        info!("Advancing slide {} -> {} ({:?}): '{}'", from, self.current_index, reason, self.media[self.current_index].id);
        self.schedule_current(now);
        Some(SlideChange {
            from,
            to: self.current_index,
            token: SlideToken { activation: self.activation, index: self.current_index },
            reason,
        })
    }

    /// Arms the countdown for the item that just became active.
    fn schedule_current(&mut self, now: Instant) {
        self.countdown = None;
        if self.media.len() < 2 {
            return;
        }
        let item = &self.media[self.current_index];
        if self.is_event_timed(item) {
            let timeout = self.timing.video_load_timeout;
            trace!("Video slide {} waiting for playback, load timeout {:?}.", self.current_index, timeout);
            self.arm(now + timeout, CountdownKind::VideoStall);
        } else {
            let shown = item
                .fixed_duration()
                .unwrap_or_default()
                .saturating_sub(self.timing.image_transition_allowance)
                .max(self.timing.min_image_duration);
            trace!("Slide {} timer set for {:?}.", self.current_index, shown);
            self.arm(now + shown, CountdownKind::Display);
        }
    }

    fn arm(&mut self, deadline: Instant, kind: CountdownKind) {
        if self.media.len() < 2 {
            return;
        }
        self.countdown = Some(Countdown { deadline, kind });
    }
}

impl Drop for SlideshowEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

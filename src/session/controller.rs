//! Session controller state machine
//!
//! Phases: `Idle → Loading → Ready → (Playing ⇄ Paused) → Ended`, with
//! `Error → Recovering → Loading` entered whenever a load fails.

use serde_json::Value;
use std::sync::Arc;
use log::{debug, info, warn};

use super::episode::{EpisodeCursor, SeasonCatalog};
use super::timer::{TimerKind, TimerSet, TimerToken};
use super::{LoadFailure, SessionEffect, SessionEvent, SessionNotice, SessionPhase};
use crate::embed::{
    decode_player_event, plan_resume, ControlMessage, EmbedOptions, PlayerEvent, PlayerEventKind, ResumePlan,
    ResumePolicy, UrlBuilder,
};
use crate::media::{IntroMarkers, MediaRef, WatchProgress};
use crate::provider::{ProviderId, ProviderRegistry};
use crate::storage::{IntroStore, MediaCollection, ProgressStore, SharedStore};
use crate::utils::clock::Clock;
use crate::utils::config::{Config, SessionConfig};

/// Pending auto-advance to the next episode
#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    pub next: MediaRef,
    pub remaining: u32,
}

/// Working memory of the active session; never persisted
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub media: Option<MediaRef>,
    pub embed_url: Option<String>,
    /// Provider and domain the current URL points at
    pub provider: Option<ProviderId>,
    pub domain: Option<String>,
    /// Set by a manual selection; blocks auto-advance until the window closes
    pub is_manual_selection: bool,
    /// Resume target to seek to once the player reports ready
    pub pending_seek_seconds: Option<u64>,
    pub has_seen_ready: bool,
    pub last_error: Option<LoadFailure>,
    /// Failed loads on the active provider since the last healthy signal
    pub domain_attempt_count: u32,
    pub countdown: Option<Countdown>,
    /// Intro already skipped during this load
    pub intro_skipped: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,

    load_plan: Option<ResumePlan>,
    load_options: EmbedOptions,
    intro: Option<IntroMarkers>,
    settle_seek_seconds: Option<u64>,
    last_progress_write_ms: Option<i64>,
    listed_in_history: bool,
}

/// Drives one embedded player session
pub struct SessionController {
    config: SessionConfig,
    urls: UrlBuilder,
    registry: ProviderRegistry,
    progress: ProgressStore,
    intro: IntroStore,
    history: MediaCollection,
    clock: Arc<dyn Clock>,
    catalog: Option<SeasonCatalog>,
    state: SessionState,
    timers: TimerSet,
}

impl SessionController {
    /// Build a controller whose stores all live in `store`
    pub fn new(config: &Config, store: SharedStore, clock: Arc<dyn Clock>) -> Self {
        let urls = UrlBuilder::new(
            config.embed.clone(),
            &config.providers,
            ResumePolicy::from(&config.session),
        );

        Self {
            config: config.session.clone(),
            urls,
            registry: ProviderRegistry::new(&config.providers, store.clone()),
            progress: ProgressStore::new(store.clone()),
            intro: IntroStore::new(store.clone()),
            history: MediaCollection::continue_watching(store, config.general.continue_watching_limit),
            clock,
            catalog: None,
            state: SessionState::default(),
            timers: TimerSet::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        match event {
            SessionEvent::Select { media, manual } => self.select(media, manual),
            SessionEvent::Frame { origin, payload } => self.on_frame_message(&origin, &payload),
            SessionEvent::LoadFailed { reason } => self.fail(LoadFailure::Transport(reason)),
            SessionEvent::NoSources => self.fail(LoadFailure::NoSources),
            SessionEvent::TimerFired { kind, token } => self.on_timer(kind, token),
            SessionEvent::Retry => self.retry(),
            SessionEvent::SwitchProvider { provider } => self.switch_provider(provider),
            SessionEvent::CancelCountdown => self.cancel_countdown(),
            SessionEvent::Catalog { catalog } => {
                self.catalog = Some(catalog);
                Vec::new()
            }
            SessionEvent::Control { message } => self.control(message),
            SessionEvent::Close => self.close(),
        }
    }

    /// Start a new title, superseding whatever was playing
    pub fn select(&mut self, media: MediaRef, manual: bool) -> Vec<SessionEffect> {
        let mut effects = self.timers.cancel_all();
        let now = self.clock.now_ms();

        if self.state.media.as_ref().map(|m| &m.id) != Some(&media.id) {
            self.catalog = None;
        }

        let (options, progress) = if manual {
            // the user chose this exact episode: start it clean
            (EmbedOptions::manual(), Some(self.progress.reset(&media, now)))
        } else {
            (EmbedOptions::resume(), self.stored_progress_for(&media, now))
        };
        let plan = plan_resume(progress.as_ref(), options, self.urls.policy());

        info!(
            "Selecting {} ({}, resume {:?})",
            media,
            if manual { "manual" } else { "auto" },
            plan
        );

        self.state = SessionState {
            media: Some(media),
            is_manual_selection: manual,
            load_plan: Some(plan),
            load_options: options,
            ..SessionState::default()
        };

        if manual {
            effects.extend(self.timers.schedule(TimerKind::ManualWindow, self.config.manual_window()));
        }

        let provider = self.registry.active_provider();
        let domain = self.registry.active_domain(provider);
        effects.extend(self.load(provider, domain));
        effects
    }

    /// Stored progress usable for `media`
    ///
    /// A series record belonging to a different episode is not a resume
    /// point for this one; the record is restarted for the new episode.
    fn stored_progress_for(&self, media: &MediaRef, now: i64) -> Option<WatchProgress> {
        let progress = self.progress.get(&media.id, media.kind)?;
        if let Some((season, episode)) = media.season_episode() {
            let same_episode = progress.season.map_or(true, |s| s == season)
                && progress.episode.map_or(true, |e| e == episode);
            if !same_episode {
                return Some(self.progress.reset(media, now));
            }
        }
        Some(progress)
    }

    /// Point the frame at the current title on `provider`/`domain`
    fn load(&mut self, provider: ProviderId, domain: String) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        effects.extend(self.timers.cancel(TimerKind::SeekSettle));
        effects.extend(self.timers.cancel(TimerKind::LoadTimeout));

        let Some(media) = self.state.media.clone() else {
            return effects;
        };
        let plan = self.state.load_plan.unwrap_or(ResumePlan::FromStart);
        let options = self.state.load_options;

        self.state.provider = Some(provider);
        self.state.domain = Some(domain.clone());
        self.state.pending_seek_seconds = plan.deferred_seconds();
        self.state.settle_seek_seconds = None;
        self.state.has_seen_ready = false;
        self.state.intro_skipped = false;
        self.state.intro = if media.is_series() { self.intro.get(&media.id) } else { None };

        match self.urls.build_with_plan(&media, plan, provider, &domain, options) {
            Ok(url) => {
                debug!("Loading {}", url);
                self.state.embed_url = Some(url.clone());
                self.set_phase(SessionPhase::Loading, &mut effects);
                effects.extend(self.timers.schedule(TimerKind::LoadTimeout, self.config.load_timeout()));
                effects.push(SessionEffect::Load { url });
            }
            Err(e) => {
                // nothing reached the frame, so the user has to pick another route
                warn!("Cannot build embed URL for {} on {}: {}", media, domain, e);
                let error = LoadFailure::Transport(e.to_string());
                self.state.embed_url = None;
                self.state.last_error = Some(error.clone());
                self.set_phase(SessionPhase::Error, &mut effects);
                effects.push(SessionEffect::Notify(SessionNotice::Failed { error }));
            }
        }
        effects
    }

    fn set_phase(&mut self, phase: SessionPhase, effects: &mut Vec<SessionEffect>) {
        if self.state.phase != phase {
            debug!("Session phase {:?} -> {:?}", self.state.phase, phase);
            self.state.phase = phase;
            effects.push(SessionEffect::Notify(SessionNotice::PhaseChanged { phase }));
        }
    }

    fn on_frame_message(&mut self, origin: &str, payload: &Value) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        let (Some(media), Some(provider)) = (self.state.media.clone(), self.state.provider) else {
            return effects;
        };

        if !self.registry.accepts_origin(provider, origin) {
            debug!("Ignoring message from foreign origin {}", origin);
            return effects;
        }
        let Some(event) = decode_player_event(payload) else {
            debug!("Ignoring malformed message from {}", origin);
            return effects;
        };
        if event.id.as_ref().is_some_and(|id| *id != media.id)
            || event.media_type.is_some_and(|kind| kind != media.kind)
        {
            debug!("Ignoring event for another title: {:?}", event.id);
            return effects;
        }

        // until the new frame reports ready, another episode means a message
        // still in flight from the previous load
        let other_episode = media.season_episode().is_some_and(|(season, episode)| {
            (event.season.unwrap_or(season), event.episode.unwrap_or(episode)) != (season, episode)
        });
        if other_episode && !self.state.has_seen_ready {
            debug!("Ignoring {:?} from another episode before {} is ready", event.event, media);
            return effects;
        }

        self.state.position_seconds = event.current_time;
        if event.duration > 0.0 {
            self.state.duration_seconds = event.duration;
        }

        self.mark_healthy(&mut effects);

        if event.event.signals_ready() && !self.state.has_seen_ready {
            self.on_player_ready(&mut effects);
        }

        match event.event {
            PlayerEventKind::Play | PlayerEventKind::Timeupdate => {
                self.set_phase(SessionPhase::Playing, &mut effects)
            }
            PlayerEventKind::Pause => self.set_phase(SessionPhase::Paused, &mut effects),
            PlayerEventKind::Ended => self.set_phase(SessionPhase::Ended, &mut effects),
            PlayerEventKind::Seeked => {}
        }

        self.follow_episode_change(&event, &mut effects);
        self.record_progress(&event);
        self.maybe_skip_intro(event.current_time, &mut effects);

        if event.event == PlayerEventKind::Ended {
            self.on_ended(&mut effects);
        }
        effects
    }

    /// A valid message proves the route works
    fn mark_healthy(&mut self, effects: &mut Vec<SessionEffect>) {
        effects.extend(self.timers.cancel(TimerKind::LoadTimeout));
        if let Some(provider) = self.state.provider {
            self.registry.mark_healthy(provider);
        }
        self.state.domain_attempt_count = 0;
        if let Some(error) = self.state.last_error.take() {
            info!("Provider healthy again after: {}", error);
        }
    }

    fn on_player_ready(&mut self, effects: &mut Vec<SessionEffect>) {
        self.state.has_seen_ready = true;
        self.set_phase(SessionPhase::Ready, effects);

        if let Some(seconds) = self.state.pending_seek_seconds.take() {
            debug!("Player ready, seeking to {}s after settle", seconds);
            self.state.settle_seek_seconds = Some(seconds);
            effects.extend(self.timers.schedule(TimerKind::SeekSettle, self.config.seek_settle()));
        }
    }

    /// The in-player episode selector moved to another episode
    ///
    /// Only reached once the current load has reported ready.
    fn follow_episode_change(&mut self, event: &PlayerEvent, effects: &mut Vec<SessionEffect>) {
        let Some(media) = self.state.media.as_ref() else {
            return;
        };
        let Some((season, episode)) = media.season_episode() else {
            return;
        };
        let reported = (event.season.unwrap_or(season), event.episode.unwrap_or(episode));
        if reported == (season, episode) {
            return;
        }

        let moved = media.with_episode(reported.0, reported.1);
        info!("Player switched episode to {}", moved);
        self.progress.set_episode(&moved.id, reported.0, reported.1);
        self.state.media = Some(moved.clone());
        effects.push(SessionEffect::Notify(SessionNotice::EpisodeChanged { media: moved }));
    }

    /// Persist position, throttled except for pause/ended/seeked
    fn record_progress(&mut self, event: &PlayerEvent) {
        // the player starts at zero until the deferred resume seek lands
        if self.state.pending_seek_seconds.is_some() || self.state.settle_seek_seconds.is_some() {
            return;
        }
        let Some(media) = self.state.media.clone() else {
            return;
        };

        let now = self.clock.now_ms();
        let due = event.event.is_terminal()
            || self
                .state
                .last_progress_write_ms
                .map_or(true, |last| now - last >= self.config.progress_throttle_ms as i64);
        if !due {
            return;
        }

        let progress = WatchProgress::new(&media, event.current_time, self.state.duration_seconds, now);
        self.progress.save(&progress);
        self.state.last_progress_write_ms = Some(now);

        if !self.state.listed_in_history {
            self.history.touch(&media, now);
            self.state.listed_in_history = true;
        }
    }

    fn maybe_skip_intro(&mut self, position: f64, effects: &mut Vec<SessionEffect>) {
        if self.state.intro_skipped {
            return;
        }
        let Some(markers) = self.state.intro else {
            return;
        };
        if markers.contains(position) {
            info!("Skipping intro to {}s", markers.end_seconds);
            self.state.intro_skipped = true;
            effects.push(SessionEffect::Post(ControlMessage::seek(markers.end_seconds)));
            effects.push(SessionEffect::Notify(SessionNotice::IntroSkipped {
                to: markers.end_seconds,
            }));
        }
    }

    fn on_ended(&mut self, effects: &mut Vec<SessionEffect>) {
        if self.state.countdown.is_some() {
            return;
        }
        let Some(media) = self.state.media.as_ref() else {
            return;
        };
        if !media.is_series() {
            return;
        }
        if self.state.is_manual_selection {
            debug!("Ended inside the manual-selection window, not auto-advancing");
            return;
        }

        let Some(cursor) = EpisodeCursor::of(media) else {
            return;
        };
        let Some(next) = cursor.next(self.catalog.as_ref()) else {
            info!("{} was the last episode", media);
            return;
        };

        let countdown = Countdown {
            next: next.apply_to(media),
            remaining: self.config.countdown_ticks,
        };
        info!("Next episode {} in {} ticks", countdown.next, countdown.remaining);
        effects.push(SessionEffect::Notify(SessionNotice::Countdown {
            remaining: countdown.remaining,
            next: countdown.next.clone(),
        }));
        self.state.countdown = Some(countdown);
        effects.extend(self.timers.schedule(TimerKind::CountdownTick, self.config.countdown_tick()));
    }

    fn on_timer(&mut self, kind: TimerKind, token: TimerToken) -> Vec<SessionEffect> {
        if !self.timers.take_if_current(kind, token) {
            debug!("Dropping stale {:?} timer", kind);
            return Vec::new();
        }

        match kind {
            TimerKind::SeekSettle => match self.state.settle_seek_seconds.take() {
                Some(seconds) => vec![SessionEffect::Post(ControlMessage::seek(seconds as f64))],
                None => Vec::new(),
            },
            TimerKind::LoadTimeout => {
                if self.state.has_seen_ready {
                    Vec::new()
                } else {
                    self.fail(LoadFailure::Timeout)
                }
            }
            TimerKind::CountdownTick => self.countdown_tick(),
            TimerKind::ManualWindow => {
                debug!("Manual-selection window closed");
                self.state.is_manual_selection = false;
                Vec::new()
            }
        }
    }

    fn countdown_tick(&mut self) -> Vec<SessionEffect> {
        let Some(countdown) = self.state.countdown.as_mut() else {
            return Vec::new();
        };
        countdown.remaining = countdown.remaining.saturating_sub(1);

        if countdown.remaining == 0 {
            let next = countdown.next.clone();
            self.state.countdown = None;
            return self.select(next, false);
        }

        let notice = SessionNotice::Countdown {
            remaining: countdown.remaining,
            next: countdown.next.clone(),
        };
        let mut effects = vec![SessionEffect::Notify(notice)];
        effects.extend(self.timers.schedule(TimerKind::CountdownTick, self.config.countdown_tick()));
        effects
    }

    fn cancel_countdown(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.state.countdown.take().is_some() {
            info!("Next-episode countdown cancelled");
            effects.extend(self.timers.cancel(TimerKind::CountdownTick));
            effects.push(SessionEffect::Notify(SessionNotice::CountdownCancelled));
        }
        effects
    }

    /// Record a failed load and immediately try the next route
    fn fail(&mut self, error: LoadFailure) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.state.media.is_none() {
            return effects;
        }

        warn!(
            "Load failed on {}: {}",
            self.state.domain.as_deref().unwrap_or("?"),
            error
        );
        self.state.last_error = Some(error.clone());
        self.set_phase(SessionPhase::Error, &mut effects);
        effects.push(SessionEffect::Notify(SessionNotice::Failed { error }));
        effects.extend(self.recover());
        effects
    }

    /// Next domain of the ring, or the other provider once the ring is spent
    fn recover(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.state.media.is_none() {
            return effects;
        }
        self.set_phase(SessionPhase::Recovering, &mut effects);

        let provider = self
            .state
            .provider
            .unwrap_or_else(|| self.registry.active_provider());
        let advance = self.registry.advance(provider);

        if advance.wrapped {
            let other = provider.other();
            self.registry.set_active_provider(other);
            self.registry.reset(other);
            let domain = self.registry.active_domain(other);
            self.state.domain_attempt_count = 0;
            info!("Provider {} exhausted, switching to {} on {}", provider, other, domain);
            effects.push(SessionEffect::Notify(SessionNotice::ProviderSwitched {
                provider: other,
                domain: domain.clone(),
            }));
            effects.extend(self.load(other, domain));
        } else {
            self.state.domain_attempt_count += 1;
            effects.push(SessionEffect::Notify(SessionNotice::DomainAdvanced {
                provider,
                domain: advance.domain.clone(),
                attempt: self.state.domain_attempt_count,
            }));
            effects.extend(self.load(provider, advance.domain));
        }
        effects
    }

    /// User-triggered retry, same path as automatic recovery
    fn retry(&mut self) -> Vec<SessionEffect> {
        if self.state.media.is_none() {
            return Vec::new();
        }
        info!("Retry requested");
        self.recover()
    }

    /// Explicit provider choice: first domain, counters reset, no ring walk
    pub fn switch_provider(&mut self, provider: ProviderId) -> Vec<SessionEffect> {
        self.registry.set_active_provider(provider);
        self.registry.reset(provider);

        if self.state.media.is_none() {
            return Vec::new();
        }

        self.state.domain_attempt_count = 0;
        self.state.last_error = None;
        let domain = self.registry.active_domain(provider);
        info!("Switched to provider {} on {}", provider, domain);

        let mut effects = vec![SessionEffect::Notify(SessionNotice::ProviderSwitched {
            provider,
            domain: domain.clone(),
        })];
        effects.extend(self.load(provider, domain));
        effects
    }

    fn control(&mut self, message: ControlMessage) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if self.state.media.is_none() {
            return effects;
        }
        if matches!(message, ControlMessage::Seek { .. }) {
            // an explicit seek overrides the deferred resume
            self.state.pending_seek_seconds = None;
            self.state.settle_seek_seconds = None;
            effects.extend(self.timers.cancel(TimerKind::SeekSettle));
        }
        effects.push(SessionEffect::Post(message));
        effects
    }

    /// Tear down the session; every pending timer is cancelled
    pub fn close(&mut self) -> Vec<SessionEffect> {
        let mut effects = self.timers.cancel_all();
        if let Some(media) = &self.state.media {
            info!("Closing session for {}", media);
        }
        self.state = SessionState::default();
        self.catalog = None;
        effects.push(SessionEffect::Notify(SessionNotice::PhaseChanged {
            phase: SessionPhase::Idle,
        }));
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::storage::MemoryStore;
    use crate::utils::clock::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    const VIDFAST: &str = "https://vidfast.pro";

    struct Harness {
        store: SharedStore,
        clock: Arc<ManualClock>,
        controller: SessionController,
    }

    impl Harness {
        fn new() -> Self {
            let store = MemoryStore::shared();
            let clock = Arc::new(ManualClock::new(1_700_000_000_000));
            let controller = SessionController::new(&Config::default(), store.clone(), clock.clone());
            Self {
                store,
                clock,
                controller,
            }
        }

        fn progress(&self) -> ProgressStore {
            ProgressStore::new(self.store.clone())
        }

        fn frame(&mut self, origin: &str, data: Value) -> Vec<SessionEffect> {
            self.controller.handle(SessionEvent::Frame {
                origin: origin.to_string(),
                payload: json!({"type": "PLAYER_EVENT", "data": data}),
            })
        }

        fn event(&mut self, name: &str, current: f64, duration: f64) -> Vec<SessionEffect> {
            self.frame(
                VIDFAST,
                json!({"event": name, "currentTime": current, "duration": duration}),
            )
        }

        /// Fire the timer of `kind` scheduled in `effects`
        fn fire(&mut self, effects: &[SessionEffect], kind: TimerKind) -> Vec<SessionEffect> {
            let token = scheduled(effects, kind).expect("timer scheduled");
            self.controller.handle(SessionEvent::TimerFired { kind, token })
        }
    }

    fn scheduled(effects: &[SessionEffect], kind: TimerKind) -> Option<TimerToken> {
        effects.iter().find_map(|e| match e {
            SessionEffect::Schedule { kind: k, token, .. } if *k == kind => Some(*token),
            _ => None,
        })
    }

    fn loaded(effects: &[SessionEffect]) -> Option<String> {
        effects.iter().find_map(|e| match e {
            SessionEffect::Load { url } => Some(url.clone()),
            _ => None,
        })
    }

    fn posts(effects: &[SessionEffect]) -> Vec<ControlMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::Post(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn notices(effects: &[SessionEffect]) -> Vec<SessionNotice> {
        effects
            .iter()
            .filter_map(|e| match e {
                SessionEffect::Notify(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    fn movie() -> MediaRef {
        MediaRef::movie(603u64)
    }

    fn show(season: u32, episode: u32) -> MediaRef {
        MediaRef::episode(1399u64, season, episode)
    }

    #[test]
    fn test_select_without_progress() {
        let mut h = Harness::new();
        let effects = h.controller.select(movie(), false);

        let url = loaded(&effects).unwrap();
        assert!(url.starts_with("https://vidfast.pro/embed/movie/603?"));
        assert!(url.contains("nextEpisode=true"));
        assert!(!url.contains("progress="));
        assert!(scheduled(&effects, TimerKind::LoadTimeout).is_some());
        assert_eq!(h.controller.phase(), SessionPhase::Loading);
        assert_eq!(h.controller.state().domain.as_deref(), Some("vidfast.pro"));
    }

    #[test]
    fn test_short_resume_goes_in_url() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&movie(), 120.0, 7200.0, 0));

        let url = loaded(&h.controller.select(movie(), false)).unwrap();
        assert!(url.contains("progress=120"));
        assert_eq!(h.controller.state().pending_seek_seconds, None);
    }

    #[test]
    fn test_long_resume_is_deferred_until_ready() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&movie(), 650.4, 7200.0, 0));

        let effects = h.controller.select(movie(), false);
        assert!(!loaded(&effects).unwrap().contains("progress="));
        assert_eq!(h.controller.state().pending_seek_seconds, Some(650));

        // the player starts from zero; that must not clobber the resume point
        let effects = h.event("play", 0.0, 7200.0);
        assert_eq!(h.controller.phase(), SessionPhase::Playing);
        assert!(posts(&effects).is_empty());
        assert_eq!(h.progress().get(&movie().id, MediaKind::Movie).unwrap().current_time_seconds, 650.4);

        let effects = h.fire(&effects, TimerKind::SeekSettle);
        assert_eq!(posts(&effects), vec![ControlMessage::seek(650.0)]);
    }

    #[test]
    fn test_near_end_rewinds() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&movie(), 7100.0, 7200.0, 0));
        h.controller.select(movie(), false);
        assert_eq!(h.controller.state().pending_seek_seconds, Some(7140));
    }

    #[test]
    fn test_manual_select_starts_clean() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&show(1, 3), 900.0, 3000.0, 0));

        let effects = h.controller.select(show(1, 3), true);
        let url = loaded(&effects).unwrap();
        assert!(url.contains("/embed/tv/1399/1/3?"));
        assert!(url.contains("nextEpisode=false"));
        assert!(!url.contains("progress="));
        assert!(scheduled(&effects, TimerKind::ManualWindow).is_some());

        let stored = h.progress().get(&show(1, 3).id, MediaKind::Series).unwrap();
        assert_eq!(stored.current_time_seconds, 0.0);
        assert_eq!(stored.duration_seconds, 3000.0);
    }

    #[test]
    fn test_other_episode_progress_not_resumed() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&show(1, 2), 900.0, 3000.0, 0));

        let url = loaded(&h.controller.select(show(1, 3), false)).unwrap();
        assert!(!url.contains("progress="));
        assert_eq!(h.controller.state().pending_seek_seconds, None);
    }

    #[test]
    fn test_timeout_advances_domain() {
        let mut h = Harness::new();
        let effects = h.controller.select(movie(), false);

        let effects = h.fire(&effects, TimerKind::LoadTimeout);
        assert!(loaded(&effects).unwrap().starts_with("https://vidfast.in/"));
        assert!(notices(&effects).contains(&SessionNotice::Failed {
            error: LoadFailure::Timeout
        }));
        assert_eq!(h.controller.state().domain_attempt_count, 1);
        assert_eq!(h.controller.state().last_error, Some(LoadFailure::Timeout));
        assert_eq!(h.controller.phase(), SessionPhase::Loading);
    }

    #[test]
    fn test_ring_exhaustion_switches_provider() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);

        let mut visited = Vec::new();
        for _ in 0..5 {
            let effects = h.controller.handle(SessionEvent::NoSources);
            visited.push(h.controller.state().domain.clone().unwrap());
            assert!(loaded(&effects).is_some());
        }
        assert_eq!(visited, ["vidfast.in", "vidfast.io", "vidfast.me", "vidfast.net", "vidfast.pro"]);

        let effects = h.controller.handle(SessionEvent::LoadFailed {
            reason: "net::ERR_NAME_NOT_RESOLVED".into(),
        });
        assert!(notices(&effects).contains(&SessionNotice::ProviderSwitched {
            provider: ProviderId::B,
            domain: "player.videasy.net".into(),
        }));
        assert!(loaded(&effects).unwrap().starts_with("https://player.videasy.net/"));
        assert_eq!(h.controller.registry().active_provider(), ProviderId::B);
        assert_eq!(h.controller.state().domain_attempt_count, 0);
    }

    #[test]
    fn test_healthy_event_resets_attempts() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);
        h.controller.handle(SessionEvent::NoSources);
        assert_eq!(h.controller.state().domain_attempt_count, 1);

        h.frame("https://vidfast.in", json!({"event": "timeupdate", "currentTime": 1, "duration": 100}));
        assert_eq!(h.controller.state().domain_attempt_count, 0);
        assert_eq!(h.controller.state().last_error, None);
        assert!(!h.controller.timers().is_pending(TimerKind::LoadTimeout));
        // the working domain sticks for the next session
        assert_eq!(h.controller.registry().active_domain(ProviderId::A), "vidfast.in");
    }

    #[test]
    fn test_stale_timer_ignored() {
        let mut h = Harness::new();
        let first = h.controller.select(movie(), false);
        h.controller.select(show(1, 1), false);

        let token = scheduled(&first, TimerKind::LoadTimeout).unwrap();
        let effects = h.controller.handle(SessionEvent::TimerFired {
            kind: TimerKind::LoadTimeout,
            token,
        });
        assert!(effects.is_empty());
        assert_eq!(h.controller.state().domain.as_deref(), Some("vidfast.pro"));
    }

    #[test]
    fn test_foreign_origin_and_other_title_ignored() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);

        assert!(h
            .frame("https://evil.example", json!({"event": "play", "currentTime": 5}))
            .is_empty());
        assert!(h
            .frame(VIDFAST, json!({"event": "play", "currentTime": 5, "id": 1, "mediaType": "movie"}))
            .is_empty());
        assert_eq!(h.controller.phase(), SessionPhase::Loading);
    }

    #[test]
    fn test_progress_writes_are_throttled() {
        let mut h = Harness::new();
        let id = movie().id;
        h.controller.select(movie(), false);

        h.event("timeupdate", 10.0, 100.0);
        h.clock.advance(Duration::from_secs(1));
        h.event("timeupdate", 11.0, 100.0);
        assert_eq!(h.progress().get(&id, MediaKind::Movie).unwrap().current_time_seconds, 10.0);

        h.event("pause", 11.5, 100.0);
        let stored = h.progress().get(&id, MediaKind::Movie).unwrap();
        assert_eq!(stored.current_time_seconds, 11.5);
        assert_eq!(h.controller.phase(), SessionPhase::Paused);

        h.clock.advance(Duration::from_secs(5));
        h.event("timeupdate", 17.0, 100.0);
        assert_eq!(h.progress().get(&id, MediaKind::Movie).unwrap().current_time_seconds, 17.0);

        let history = MediaCollection::continue_watching(h.store.clone(), 10).list();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
    }

    #[test]
    fn test_intro_skipped_once() {
        let mut h = Harness::new();
        IntroStore::new(h.store.clone()).set(&show(1, 1).id, 30.0, 90.0);
        h.controller.select(show(1, 1), false);

        h.event("timeupdate", 10.0, 3000.0);
        let effects = h.event("timeupdate", 31.0, 3000.0);
        assert_eq!(posts(&effects), vec![ControlMessage::seek(90.0)]);
        assert!(h.controller.state().intro_skipped);

        let effects = h.event("seeked", 35.0, 3000.0);
        assert!(posts(&effects).is_empty());
    }

    #[test]
    fn test_countdown_advances_to_next_episode() {
        let mut h = Harness::new();
        h.controller.select(show(1, 1), false);

        let mut effects = h.event("ended", 3000.0, 3000.0);
        assert!(notices(&effects).contains(&SessionNotice::Countdown {
            remaining: 5,
            next: show(1, 2)
        }));

        for remaining in (1..5).rev() {
            effects = h.fire(&effects, TimerKind::CountdownTick);
            assert_eq!(h.controller.state().countdown.as_ref().unwrap().remaining, remaining);
        }
        effects = h.fire(&effects, TimerKind::CountdownTick);

        assert!(loaded(&effects).unwrap().contains("/embed/tv/1399/1/2?"));
        assert_eq!(h.controller.state().media, Some(show(1, 2)));
        assert_eq!(h.controller.state().countdown, None);
    }

    #[test]
    fn test_countdown_uses_catalog_rollover() {
        let mut h = Harness::new();
        h.controller.select(show(1, 10), false);
        h.controller.handle(SessionEvent::Catalog {
            catalog: SeasonCatalog::new([(1, 10), (2, 8)]),
        });

        h.event("ended", 3000.0, 3000.0);
        assert_eq!(h.controller.state().countdown.as_ref().unwrap().next, show(2, 1));
    }

    #[test]
    fn test_cancel_countdown() {
        let mut h = Harness::new();
        h.controller.select(show(1, 1), false);
        let ended = h.event("ended", 3000.0, 3000.0);

        let effects = h.controller.handle(SessionEvent::CancelCountdown);
        assert!(effects.contains(&SessionEffect::Cancel {
            kind: TimerKind::CountdownTick
        }));
        assert!(notices(&effects).contains(&SessionNotice::CountdownCancelled));
        assert!(h.fire(&ended, TimerKind::CountdownTick).is_empty());
    }

    #[test]
    fn test_manual_window_blocks_auto_advance() {
        let mut h = Harness::new();
        let selected = h.controller.select(show(1, 1), true);

        h.event("ended", 3000.0, 3000.0);
        assert_eq!(h.controller.state().countdown, None);

        h.fire(&selected, TimerKind::ManualWindow);
        assert!(!h.controller.state().is_manual_selection);
        h.event("ended", 3000.0, 3000.0);
        assert!(h.controller.state().countdown.is_some());
    }

    #[test]
    fn test_movie_end_has_no_countdown() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);
        h.event("ended", 7200.0, 7200.0);
        assert_eq!(h.controller.phase(), SessionPhase::Ended);
        assert_eq!(h.controller.state().countdown, None);
    }

    #[test]
    fn test_player_episode_change_followed() {
        let mut h = Harness::new();
        h.controller.select(show(1, 1), false);
        h.event("play", 0.0, 3000.0);

        let effects = h.frame(
            VIDFAST,
            json!({"event": "timeupdate", "currentTime": 3, "duration": 3000, "id": 1399, "mediaType": "tv", "season": 1, "episode": 2}),
        );
        assert!(notices(&effects).contains(&SessionNotice::EpisodeChanged { media: show(1, 2) }));
        assert_eq!(h.controller.state().media, Some(show(1, 2)));

        let stored = h.progress().get(&show(1, 2).id, MediaKind::Series).unwrap();
        assert_eq!((stored.season, stored.episode), (Some(1), Some(2)));
    }

    #[test]
    fn test_late_message_from_previous_episode_dropped() {
        let mut h = Harness::new();
        h.controller.select(show(1, 2), false);
        h.frame(
            VIDFAST,
            json!({"event": "timeupdate", "currentTime": 2400, "duration": 3000, "id": 1399, "mediaType": "tv", "season": 1, "episode": 2}),
        );

        h.controller.select(show(1, 3), true);
        let effects = h.frame(
            VIDFAST,
            json!({"event": "pause", "currentTime": 2401, "duration": 3000, "id": 1399, "mediaType": "tv", "season": 1, "episode": 2}),
        );
        assert!(effects.is_empty());
        assert_eq!(h.controller.state().media, Some(show(1, 3)));
        assert_eq!(h.controller.phase(), SessionPhase::Loading);

        let stored = h.progress().get(&show(1, 3).id, MediaKind::Series).unwrap();
        assert_eq!((stored.season, stored.episode), (Some(1), Some(3)));
        assert_eq!(stored.current_time_seconds, 0.0);

        // the new frame answers for the episode it was loaded with
        h.frame(
            VIDFAST,
            json!({"event": "play", "currentTime": 0, "duration": 3000, "id": 1399, "mediaType": "tv", "season": 1, "episode": 3}),
        );
        assert_eq!(h.controller.phase(), SessionPhase::Playing);
        assert_eq!(h.controller.state().media, Some(show(1, 3)));
    }

    #[test]
    fn test_manual_click_on_next_episode_restarts_record() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&show(1, 2), 2400.0, 3000.0, 0));

        let effects = h.controller.select(show(1, 3), true);
        let url = loaded(&effects).unwrap();
        assert!(url.contains("/embed/tv/1399/1/3?"));
        assert!(url.contains("nextEpisode=false"));
        assert!(!url.contains("progress="));
        assert!(h.controller.state().is_manual_selection);
        assert_eq!(h.controller.state().pending_seek_seconds, None);

        let stored = h.progress().get(&show(1, 3).id, MediaKind::Series).unwrap();
        assert_eq!((stored.season, stored.episode), (Some(1), Some(3)));
        assert_eq!(stored.current_time_seconds, 0.0);
        assert_eq!(stored.percent, 0.0);
    }

    #[test]
    fn test_switch_provider_resets_ring() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);
        h.controller.handle(SessionEvent::NoSources);

        let effects = h.controller.handle(SessionEvent::SwitchProvider {
            provider: ProviderId::B,
        });
        assert!(loaded(&effects).unwrap().starts_with("https://player.videasy.net/"));
        assert_eq!(h.controller.state().last_error, None);
        assert_eq!(h.controller.state().domain_attempt_count, 0);

        // messages from the old provider no longer count
        assert!(h.event("play", 1.0, 100.0).is_empty());
        h.frame("https://player.videasy.net", json!({"event": "play", "currentTime": 1}));
        assert_eq!(h.controller.phase(), SessionPhase::Playing);
    }

    #[test]
    fn test_retry_walks_ring() {
        let mut h = Harness::new();
        h.controller.select(movie(), false);
        let effects = h.controller.handle(SessionEvent::Retry);
        assert!(loaded(&effects).unwrap().starts_with("https://vidfast.in/"));
    }

    #[test]
    fn test_user_seek_cancels_deferred_resume() {
        let mut h = Harness::new();
        h.progress().save(&WatchProgress::new(&movie(), 650.0, 7200.0, 0));
        h.controller.select(movie(), false);
        let ready = h.event("play", 0.0, 7200.0);

        let effects = h.controller.handle(SessionEvent::Control {
            message: ControlMessage::seek(30.0),
        });
        assert_eq!(posts(&effects), vec![ControlMessage::seek(30.0)]);
        assert!(h.fire(&ready, TimerKind::SeekSettle).is_empty());
    }

    #[test]
    fn test_close_cancels_everything() {
        let mut h = Harness::new();
        h.controller.select(show(1, 1), true);
        let effects = h.controller.close();
        assert!(effects.contains(&SessionEffect::Cancel {
            kind: TimerKind::LoadTimeout
        }));
        assert!(effects.contains(&SessionEffect::Cancel {
            kind: TimerKind::ManualWindow
        }));
        assert_eq!(h.controller.timers().pending_count(), 0);
        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        assert!(h.controller.handle(SessionEvent::Retry).is_empty());
    }
}

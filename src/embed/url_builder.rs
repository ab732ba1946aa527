//! Embed URL construction
//!
//! `https://{domain}/embed/{movie|tv}/{id}[/{season}/{episode}]?{params}`
//!
//! Short resumes ride in the URL as `progress`. Long ones are left out and
//! applied by the session as a seek once the player reports ready, because
//! large start offsets in the URL desync audio and video in the remote
//! player.

use url::Url;

use crate::media::{MediaRef, WatchProgress};
use crate::provider::ProviderId;
use crate::utils::config::{EmbedConfig, ProvidersConfig, SessionConfig};
use crate::utils::error::{FluxError, Result};

/// Per-load switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmbedOptions {
    /// Let the remote player roll into the next episode by itself
    pub enable_auto_advance: bool,

    /// Start from stored progress
    pub allow_resume: bool,
}

impl EmbedOptions {
    /// A title the user picked explicitly: start clean, no auto-advance
    pub fn manual() -> Self {
        Self {
            enable_auto_advance: false,
            allow_resume: false,
        }
    }

    /// App-initiated continuation
    pub fn resume() -> Self {
        Self {
            enable_auto_advance: true,
            allow_resume: true,
        }
    }
}

/// Thresholds deciding where playback resumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumePolicy {
    pub min_secs: f64,
    pub url_max_secs: f64,
    pub rewind_secs: f64,
    pub near_end_percent: f64,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for ResumePolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            min_secs: config.resume_min_secs,
            url_max_secs: config.resume_url_max_secs,
            rewind_secs: config.near_end_rewind_secs,
            near_end_percent: config.near_end_percent,
        }
    }
}

/// How stored progress is applied to a load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePlan {
    /// Start at zero
    FromStart,

    /// `progress={seconds}` in the URL
    InUrl(u64),

    /// Load from zero, seek after the player is ready
    DeferredSeek(u64),
}

impl ResumePlan {
    pub fn url_seconds(&self) -> Option<u64> {
        match self {
            ResumePlan::InUrl(s) => Some(*s),
            _ => None,
        }
    }

    pub fn deferred_seconds(&self) -> Option<u64> {
        match self {
            ResumePlan::DeferredSeek(s) => Some(*s),
            _ => None,
        }
    }
}

/// Decide where to resume
///
/// Positions under `min_secs` are treated as an accidental preview. Above
/// `near_end_percent` the resume point is pulled back to `duration -
/// rewind_secs` so the title does not end the moment it reopens.
pub fn plan_resume(
    progress: Option<&WatchProgress>,
    options: EmbedOptions,
    policy: &ResumePolicy,
) -> ResumePlan {
    let Some(progress) = progress.filter(|_| options.allow_resume) else {
        return ResumePlan::FromStart;
    };

    let watched = progress.current_time_seconds;
    if !watched.is_finite() || watched < policy.min_secs {
        return ResumePlan::FromStart;
    }

    let effective = if progress.percent > policy.near_end_percent {
        (progress.duration_seconds - policy.rewind_secs).max(0.0)
    } else {
        watched
    };

    if effective < policy.min_secs {
        ResumePlan::FromStart
    } else if effective <= policy.url_max_secs {
        ResumePlan::InUrl(effective.floor() as u64)
    } else {
        ResumePlan::DeferredSeek(effective.floor() as u64)
    }
}

/// Builds embed URLs from configuration
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    embed: EmbedConfig,
    policy: ResumePolicy,
    embed_path_a: String,
    embed_path_b: String,
}

impl UrlBuilder {
    pub fn new(embed: EmbedConfig, providers: &ProvidersConfig, policy: ResumePolicy) -> Self {
        Self {
            embed,
            policy,
            embed_path_a: providers.a.embed_path.clone(),
            embed_path_b: providers.b.embed_path.clone(),
        }
    }

    pub fn policy(&self) -> &ResumePolicy {
        &self.policy
    }

    /// Build the URL for `media` on `domain`
    pub fn build(
        &self,
        media: &MediaRef,
        progress: Option<&WatchProgress>,
        provider: ProviderId,
        domain: &str,
        options: EmbedOptions,
    ) -> Result<String> {
        let plan = plan_resume(progress, options, &self.policy);
        self.build_with_plan(media, plan, provider, domain, options)
    }

    /// Build with an already computed resume plan
    pub fn build_with_plan(
        &self,
        media: &MediaRef,
        plan: ResumePlan,
        provider: ProviderId,
        domain: &str,
        options: EmbedOptions,
    ) -> Result<String> {
        let mut url = Url::parse(&format!("https://{}/", domain.trim()))?;
        if url.host_str().map(|h| h.eq_ignore_ascii_case(domain.trim())) != Some(true) {
            return Err(FluxError::InvalidInput(format!("'{}' is not a bare hostname", domain)));
        }

        let embed_path = match provider {
            ProviderId::A => &self.embed_path_a,
            ProviderId::B => &self.embed_path_b,
        };

        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FluxError::InvalidInput(format!("'{}' cannot carry a path", domain)))?;
            segments.pop_if_empty();
            segments.extend(embed_path.split('/').filter(|s| !s.is_empty()));
            segments.push(media.kind.as_str()).push(media.id.as_str());
            if let Some((season, episode)) = media.season_episode() {
                segments.push(&season.to_string()).push(&episode.to_string());
            }
        }

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("autoPlay", bool_str(self.embed.autoplay))
                .append_pair("color", self.embed.color.trim_start_matches('#'))
                .append_pair("nextEpisode", bool_str(options.enable_auto_advance));
            if media.is_series() {
                query.append_pair("episodeSelector", "true");
            }
            query
                .append_pair("sub", &self.embed.subtitle_language)
                .append_pair("captions", bool_str(self.embed.captions));
            if let Some(seconds) = plan.url_seconds() {
                query.append_pair("progress", &seconds.to_string());
            }
        }

        Ok(url.into())
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> UrlBuilder {
        UrlBuilder::new(EmbedConfig::default(), &ProvidersConfig::default(), ResumePolicy::default())
    }

    fn progress(current: f64, duration: f64) -> WatchProgress {
        WatchProgress::new(&MediaRef::movie(603u64), current, duration, 0)
    }

    fn query_value(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_movie_path() {
        let url = builder()
            .build(&MediaRef::movie(603u64), None, ProviderId::A, "vidfast.pro", EmbedOptions::resume())
            .unwrap();
        assert!(url.starts_with("https://vidfast.pro/embed/movie/603?"));
        assert_eq!(query_value(&url, "autoPlay").as_deref(), Some("true"));
        assert_eq!(query_value(&url, "color").as_deref(), Some("e50914"));
        assert_eq!(query_value(&url, "episodeSelector"), None);
        assert_eq!(query_value(&url, "progress"), None);
    }

    #[test]
    fn test_series_path_and_flags() {
        let url = builder()
            .build(&MediaRef::episode("1399", 2, 5), None, ProviderId::A, "vidfast.pro", EmbedOptions::manual())
            .unwrap();
        assert!(url.starts_with("https://vidfast.pro/embed/tv/1399/2/5?"));
        assert_eq!(query_value(&url, "nextEpisode").as_deref(), Some("false"));
        assert_eq!(query_value(&url, "episodeSelector").as_deref(), Some("true"));
    }

    #[test]
    fn test_no_resume_below_one_minute() {
        for current in [0.0, 1.0, 30.0, 59.99] {
            let p = progress(current, 7200.0);
            assert_eq!(plan_resume(Some(&p), EmbedOptions::resume(), &ResumePolicy::default()), ResumePlan::FromStart);
            let url = builder()
                .build(&MediaRef::movie(603u64), Some(&p), ProviderId::A, "vidfast.pro", EmbedOptions::resume())
                .unwrap();
            assert_eq!(query_value(&url, "progress"), None);
        }
    }

    #[test]
    fn test_short_resume_in_url() {
        for (current, expected) in [(60.0, "60"), (125.7, "125"), (300.0, "300")] {
            let p = progress(current, 7200.0);
            let url = builder()
                .build(&MediaRef::movie(603u64), Some(&p), ProviderId::A, "vidfast.pro", EmbedOptions::resume())
                .unwrap();
            assert_eq!(query_value(&url, "progress").as_deref(), Some(expected));
        }
    }

    #[test]
    fn test_long_resume_deferred() {
        let p = progress(650.0, 7200.0);
        assert_eq!(
            plan_resume(Some(&p), EmbedOptions::resume(), &ResumePolicy::default()),
            ResumePlan::DeferredSeek(650)
        );
        let url = builder()
            .build(&MediaRef::movie(603u64), Some(&p), ProviderId::A, "vidfast.pro", EmbedOptions::resume())
            .unwrap();
        assert_eq!(query_value(&url, "progress"), None);
    }

    #[test]
    fn test_near_end_rewinds_one_minute() {
        let p = progress(7100.0, 7200.0);
        assert!(p.percent > 95.0);
        assert_eq!(
            plan_resume(Some(&p), EmbedOptions::resume(), &ResumePolicy::default()),
            ResumePlan::DeferredSeek(7140)
        );

        // short title: clamped point lands inside the URL window
        let p = progress(290.0, 300.0);
        assert_eq!(
            plan_resume(Some(&p), EmbedOptions::resume(), &ResumePolicy::default()),
            ResumePlan::InUrl(240)
        );

        // clamped below the minimum: start over
        let p = progress(98.0, 100.0);
        assert_eq!(plan_resume(Some(&p), EmbedOptions::resume(), &ResumePolicy::default()), ResumePlan::FromStart);
    }

    #[test]
    fn test_manual_ignores_progress() {
        let p = progress(200.0, 7200.0);
        assert_eq!(plan_resume(Some(&p), EmbedOptions::manual(), &ResumePolicy::default()), ResumePlan::FromStart);
    }

    #[test]
    fn test_rejects_domain_with_path() {
        let result = builder().build(&MediaRef::movie(1u64), None, ProviderId::A, "x.test/evil", EmbedOptions::resume());
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_embed_path() {
        let mut providers = ProvidersConfig::default();
        providers.b.embed_path = "player/embed".to_string();
        let builder = UrlBuilder::new(EmbedConfig::default(), &providers, ResumePolicy::default());
        let url = builder
            .build(&MediaRef::movie(1u64), None, ProviderId::B, "player.videasy.net", EmbedOptions::resume())
            .unwrap();
        assert!(url.starts_with("https://player.videasy.net/player/embed/movie/1?"));
    }

    #[test]
    fn test_id_is_path_encoded() {
        let url = builder()
            .build(&MediaRef::movie("a b/c"), None, ProviderId::A, "vidfast.pro", EmbedOptions::resume())
            .unwrap();
        assert!(url.starts_with("https://vidfast.pro/embed/movie/a%20b%2Fc?"));
    }
}

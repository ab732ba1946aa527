//! Provider/domain registry with persisted selection

use log::{debug, info, warn};
use url::Url;

use super::{ProviderConfig, ProviderId};
use crate::storage::{read_json, write_json, SharedStore, KEY_PREFIX};
use crate::utils::config::{ProviderSettings, ProvidersConfig};

/// Result of stepping a provider's domain ring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainAdvance {
    /// Domain to load next
    pub domain: String,

    /// Every domain has been tried since the last reset
    pub wrapped: bool,
}

#[derive(Debug, Clone)]
struct ProviderEntry {
    family: String,
    domains: Vec<String>,
    /// Advances since the last reset
    steps: usize,
}

impl ProviderEntry {
    fn from_settings(settings: &ProviderSettings) -> Self {
        let domains: Vec<String> = settings
            .domains
            .iter()
            .map(|d| d.trim().to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            family: settings.family.to_ascii_lowercase(),
            domains,
            steps: 0,
        }
    }
}

/// Ordered domain rings for both providers plus the active selection
pub struct ProviderRegistry {
    store: SharedStore,
    default_provider: ProviderId,
    a: ProviderEntry,
    b: ProviderEntry,
}

impl ProviderRegistry {
    /// Build from configuration
    ///
    /// Configuration is validated before it reaches here, so both rings
    /// are non-empty.
    pub fn new(config: &ProvidersConfig, store: SharedStore) -> Self {
        Self {
            store,
            default_provider: config.default_provider,
            a: ProviderEntry::from_settings(&config.a),
            b: ProviderEntry::from_settings(&config.b),
        }
    }

    fn entry(&self, provider: ProviderId) -> &ProviderEntry {
        match provider {
            ProviderId::A => &self.a,
            ProviderId::B => &self.b,
        }
    }

    fn entry_mut(&mut self, provider: ProviderId) -> &mut ProviderEntry {
        match provider {
            ProviderId::A => &mut self.a,
            ProviderId::B => &mut self.b,
        }
    }

    fn active_key() -> String {
        format!("{}provider:active", KEY_PREFIX)
    }

    fn domain_key(provider: ProviderId) -> String {
        format!("{}provider:{}:domain", KEY_PREFIX, provider)
    }

    pub fn active_provider(&self) -> ProviderId {
        read_json(self.store.as_ref(), &Self::active_key()).unwrap_or(self.default_provider)
    }

    pub fn set_active_provider(&mut self, provider: ProviderId) {
        if self.active_provider() != provider {
            info!("Active provider set to {}", provider);
        }
        write_json(self.store.as_ref(), &Self::active_key(), &provider);
    }

    pub fn domains(&self, provider: ProviderId) -> &[String] {
        &self.entry(provider).domains
    }

    fn active_index(&self, provider: ProviderId) -> usize {
        let domains = self.domains(provider);
        read_json::<String>(self.store.as_ref(), &Self::domain_key(provider))
            .and_then(|saved| domains.iter().position(|d| *d == saved))
            .unwrap_or(0)
    }

    /// Persisted domain if it is still in the ring, else the first one
    pub fn active_domain(&self, provider: ProviderId) -> String {
        self.domains(provider)
            .get(self.active_index(provider))
            .cloned()
            .unwrap_or_default()
    }

    /// Pin a provider to one of its domains; unknown domains are refused
    pub fn set_active_domain(&mut self, provider: ProviderId, domain: &str) -> bool {
        let domain = domain.trim().to_ascii_lowercase();
        if !self.domains(provider).contains(&domain) {
            warn!("{} is not a domain of provider {}", domain, provider);
            return false;
        }
        self.entry_mut(provider).steps = 0;
        write_json(self.store.as_ref(), &Self::domain_key(provider), &domain)
    }

    /// Step to the next domain of the ring
    ///
    /// With N domains the first N advances land on every domain once, the
    /// last of them being the domain the walk started from. Advance N+1
    /// reports `wrapped` and leaves the selection where it is.
    pub fn advance(&mut self, provider: ProviderId) -> DomainAdvance {
        let len = self.domains(provider).len();
        let current = self.active_index(provider);

        let entry = self.entry_mut(provider);
        entry.steps += 1;
        if entry.steps > len {
            debug!("Provider {} ring exhausted after {} advances", provider, len);
            return DomainAdvance {
                domain: entry.domains[current].clone(),
                wrapped: true,
            };
        }

        let next = (current + 1) % len;
        let domain = entry.domains[next].clone();
        write_json(self.store.as_ref(), &Self::domain_key(provider), &domain);
        debug!("Provider {} advanced to {}", provider, domain);

        DomainAdvance {
            domain,
            wrapped: false,
        }
    }

    /// Back to the first domain with a fresh walk
    pub fn reset(&mut self, provider: ProviderId) {
        self.entry_mut(provider).steps = 0;
        let first = self.domains(provider)[0].clone();
        write_json(self.store.as_ref(), &Self::domain_key(provider), &first);
    }

    /// Forget failed attempts without moving the selection
    pub fn mark_healthy(&mut self, provider: ProviderId) {
        self.entry_mut(provider).steps = 0;
    }

    pub fn snapshot(&self, provider: ProviderId) -> ProviderConfig {
        ProviderConfig {
            provider_id: provider,
            domains: self.domains(provider).to_vec(),
            active_domain_index: self.active_index(provider),
        }
    }

    /// Whether a frame message origin belongs to `provider`
    pub fn accepts_origin(&self, provider: ProviderId, origin: &str) -> bool {
        let entry = self.entry(provider);
        let origin = origin.trim().to_ascii_lowercase();

        let host = match Url::parse(&origin) {
            Ok(url) => match url.host_str() {
                Some(host) => host.to_string(),
                None => return false,
            },
            Err(_) => origin,
        };

        host.contains(&entry.family)
            || entry
                .domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn providers(a: &[&str], b: &[&str]) -> ProvidersConfig {
        ProvidersConfig {
            default_provider: ProviderId::A,
            a: ProviderSettings {
                family: "alpha".to_string(),
                domains: a.iter().map(|s| s.to_string()).collect(),
                embed_path: "embed".to_string(),
            },
            b: ProviderSettings {
                family: "beta".to_string(),
                domains: b.iter().map(|s| s.to_string()).collect(),
                embed_path: "embed".to_string(),
            },
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(
            &providers(&["alpha.one", "alpha.two", "alpha.three"], &["beta.one"]),
            MemoryStore::shared(),
        )
    }

    #[test]
    fn test_defaults() {
        let registry = registry();
        assert_eq!(registry.active_provider(), ProviderId::A);
        assert_eq!(registry.active_domain(ProviderId::A), "alpha.one");
        assert_eq!(registry.domains(ProviderId::B), ["beta.one".to_string()]);
    }

    #[test]
    fn test_active_provider_persisted() {
        let store = MemoryStore::shared();
        let config = providers(&["alpha.one"], &["beta.one"]);
        let mut registry = ProviderRegistry::new(&config, store.clone());
        registry.set_active_provider(ProviderId::B);

        let reopened = ProviderRegistry::new(&config, store);
        assert_eq!(reopened.active_provider(), ProviderId::B);
    }

    #[test]
    fn test_stale_domain_falls_back_to_first() {
        let store = MemoryStore::shared();
        let mut registry =
            ProviderRegistry::new(&providers(&["alpha.one", "alpha.two"], &["beta.one"]), store.clone());
        assert!(registry.set_active_domain(ProviderId::A, "alpha.two"));
        assert_eq!(registry.active_domain(ProviderId::A), "alpha.two");

        // the saved domain was removed from configuration
        let reopened = ProviderRegistry::new(&providers(&["alpha.one", "alpha.three"], &["beta.one"]), store);
        assert_eq!(reopened.active_domain(ProviderId::A), "alpha.one");
    }

    #[test]
    fn test_ring_visits_each_domain_once_then_wraps() {
        let mut registry = registry();
        let visited: Vec<DomainAdvance> = (0..3).map(|_| registry.advance(ProviderId::A)).collect();
        let domains: Vec<&str> = visited.iter().map(|a| a.domain.as_str()).collect();
        assert_eq!(domains, vec!["alpha.two", "alpha.three", "alpha.one"]);
        assert!(visited.iter().all(|a| !a.wrapped));

        assert!(registry.advance(ProviderId::A).wrapped);
    }

    #[test]
    fn test_reset_and_healthy_restart_walk() {
        let mut registry = registry();
        registry.advance(ProviderId::A);
        registry.advance(ProviderId::A);
        registry.reset(ProviderId::A);
        assert_eq!(registry.active_domain(ProviderId::A), "alpha.one");
        assert_eq!(registry.snapshot(ProviderId::A).active_domain_index, 0);

        for _ in 0..3 {
            assert!(!registry.advance(ProviderId::A).wrapped);
        }
        registry.mark_healthy(ProviderId::A);
        assert!(!registry.advance(ProviderId::A).wrapped);
    }

    #[test]
    fn test_unknown_domain_refused() {
        let mut registry = registry();
        assert!(!registry.set_active_domain(ProviderId::A, "beta.one"));
        assert_eq!(registry.active_domain(ProviderId::A), "alpha.one");
    }

    #[test]
    fn test_accepts_origin() {
        let registry = registry();
        assert!(registry.accepts_origin(ProviderId::A, "https://alpha.two"));
        assert!(registry.accepts_origin(ProviderId::A, "https://cdn.alpha-mirror.net"));
        assert!(registry.accepts_origin(ProviderId::A, "https://www.alpha.one"));
        assert!(!registry.accepts_origin(ProviderId::A, "https://beta.one"));
        assert!(!registry.accepts_origin(ProviderId::B, "https://evil.example"));
        assert!(!registry.accepts_origin(ProviderId::A, "null"));
    }
}

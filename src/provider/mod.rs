//! Embed providers
//!
//! Two interchangeable third-party players are configured, each reachable
//! through an ordered ring of mirror domains. Exactly one provider is active
//! at a time; the choice and each provider's current domain are persisted.

mod registry;

pub use registry::{DomainAdvance, ProviderRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    A,
    B,
}

impl ProviderId {
    /// The provider to fall back to when this one is exhausted
    pub fn other(self) -> Self {
        match self {
            ProviderId::A => ProviderId::B,
            ProviderId::B => ProviderId::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::A => "A",
            ProviderId::B => "B",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(ProviderId::A),
            "B" => Ok(ProviderId::B),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Point-in-time view of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider_id: ProviderId,
    pub domains: Vec<String>,
    pub active_domain_index: usize,
}

impl ProviderConfig {
    pub fn active_domain(&self) -> &str {
        &self.domains[self.active_domain_index]
    }
}

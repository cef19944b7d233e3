//! Provider table, credentials and per-provider configuration.

use refiner_error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of a recognised backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    /// Fast open-weight models served by Groq
    Groq,
    /// General-purpose OpenAI models
    OpenAI,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        self.spec().id
    }

    /// Static table entry for this provider
    pub fn spec(&self) -> &'static ProviderSpec {
        match self {
            ProviderId::Groq => &PROVIDERS[0],
            ProviderId::OpenAI => &PROVIDERS[1],
        }
    }

    pub fn all() -> impl Iterator<Item = ProviderId> {
        PROVIDERS.iter().map(|spec| spec.provider)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        PROVIDERS
            .iter()
            .find(|spec| spec.id.eq_ignore_ascii_case(wanted))
            .map(|spec| spec.provider)
            .ok_or_else(|| Error::unsupported_provider(s).with_operation("provider::parse"))
    }
}

/// Endpoint, model and credential source of one provider
#[derive(Debug)]
pub struct ProviderSpec {
    pub provider: ProviderId,
    pub id: &'static str,
    pub base_url: &'static str,
    pub model: &'static str,
    pub api_key_env: &'static str,
}

/// Every recognised provider. Order matches `ProviderId::spec`.
pub static PROVIDERS: [ProviderSpec; 2] = [
    ProviderSpec {
        provider: ProviderId::Groq,
        id: "groq",
        base_url: "https://api.groq.com/openai/v1",
        model: "llama-3.3-70b-versatile",
        api_key_env: "GROQ_API_KEY",
    },
    ProviderSpec {
        provider: ProviderId::OpenAI,
        id: "openai",
        base_url: "https://api.openai.com/v1",
        model: "gpt-4",
        api_key_env: "OPENAI_API_KEY",
    },
];

/// API keys for the recognised providers.
///
/// Captured once at startup and passed down by reference; nothing reads the
/// environment after that.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<ProviderId, String>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the provider API keys from the process environment.
    /// Unset and blank variables are treated alike.
    pub fn from_env() -> Self {
        let mut credentials = Self::new();
        for spec in &PROVIDERS {
            if let Ok(key) = std::env::var(spec.api_key_env) {
                credentials = credentials.with_key(spec.provider, key);
            }
        }
        credentials
    }

    pub fn with_key(mut self, provider: ProviderId, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.keys.insert(provider, key.trim().to_string());
        }
        self
    }

    pub fn get(&self, provider: ProviderId) -> Option<&str> {
        self.keys.get(&provider).map(String::as_str)
    }
}

// Keys stay out of logs and panic messages.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut present: Vec<&str> = self.keys.keys().map(|p| p.as_str()).collect();
        present.sort_unstable();
        f.debug_struct("Credentials").field("present", &present).finish()
    }
}

/// Configuration for creating a provider client
#[derive(Clone)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub headers: HashMap<String, String>,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

    /// Build the configuration for `id` from the provider table.
    ///
    /// Fails with `ConfigInvalid` when the provider's API key is missing.
    pub fn resolve(id: ProviderId, credentials: &Credentials) -> Result<Self> {
        let spec = id.spec();
        let api_key = credentials
            .get(id)
            .ok_or_else(|| {
                Error::missing_credential(spec.id, spec.api_key_env)
                    .with_operation("provider::resolve")
            })?
            .to_string();

        Ok(Self {
            id,
            api_key,
            base_url: spec.base_url.to_string(),
            default_model: spec.model.to_string(),
            headers: HashMap::new(),
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refiner_error::ErrorKind;

    #[test]
    fn test_parse_provider_id() {
        assert_eq!("groq".parse::<ProviderId>().unwrap(), ProviderId::Groq);
        assert_eq!("OpenAI".parse::<ProviderId>().unwrap(), ProviderId::OpenAI);
        assert_eq!(" groq ".parse::<ProviderId>().unwrap(), ProviderId::Groq);
    }

    #[test]
    fn test_unknown_provider_is_unsupported() {
        let err = "anthropic".parse::<ProviderId>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.message(), "Unsupported provider: anthropic");
        assert_eq!(err.context_value("provider"), Some("anthropic"));
    }

    #[test]
    fn test_table_matches_ids() {
        for id in ProviderId::all() {
            assert_eq!(id.spec().provider, id);
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!(ProviderId::Groq.spec().model, "llama-3.3-70b-versatile");
        assert_eq!(ProviderId::OpenAI.spec().api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_resolve_uses_table() {
        let creds = Credentials::new().with_key(ProviderId::Groq, "gsk-test");
        let config = ProviderConfig::resolve(ProviderId::Groq, &creds).unwrap();

        assert_eq!(config.api_key, "gsk-test");
        assert_eq!(config.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.default_model, "llama-3.3-70b-versatile");
        assert_eq!(config.timeout_secs, ProviderConfig::DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_resolve_without_key() {
        let creds = Credentials::new()
            .with_key(ProviderId::Groq, "gsk-test")
            .with_key(ProviderId::OpenAI, "   ");

        let err = ProviderConfig::resolve(ProviderId::OpenAI, &creds).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.context_value("env_var"), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let creds = Credentials::new().with_key(ProviderId::OpenAI, "sk-test");
        let config = ProviderConfig::resolve(ProviderId::OpenAI, &creds)
            .unwrap()
            .with_model("gpt-4o")
            .with_base_url("http://localhost:8080/v1/")
            .with_timeout(5)
            .with_header("OpenAI-Organization", "org-test");

        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.headers["OpenAI-Organization"], "org-test");
    }

    #[test]
    fn test_debug_redacts_keys() {
        let creds = Credentials::new().with_key(ProviderId::Groq, "gsk-secret");
        assert!(!format!("{:?}", creds).contains("gsk-secret"));

        let config = ProviderConfig::resolve(ProviderId::Groq, &creds).unwrap();
        assert!(!format!("{:?}", config).contains("gsk-secret"));
    }
}

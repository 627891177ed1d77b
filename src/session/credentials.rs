use crate::config::LiveConfig;

/// Supplies the API key at connect time
pub trait CredentialSource: Send + Sync {
    /// The key, or `None` when nothing is configured
    fn api_key(&self) -> Option<String>;

    /// Where the key is expected to come from, for error messages
    fn describe(&self) -> String;
}

/// Reads the key from an environment variable on every connect
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    fn describe(&self) -> String {
        format!("the {} environment variable", self.var)
    }
}

/// A key fixed at construction (config file, tests)
#[derive(Debug, Clone)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(key: Option<String>) -> Self {
        Self(key)
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        self.0.clone().filter(|key| !key.trim().is_empty())
    }

    fn describe(&self) -> String {
        "live.api_key".to_string()
    }
}

/// Inline key when configured, otherwise the configured environment variable
pub fn credentials_from_config(config: &LiveConfig) -> Box<dyn CredentialSource> {
    match &config.api_key {
        Some(key) if !key.trim().is_empty() => Box::new(StaticCredentials::new(Some(key.clone()))),
        _ => Box::new(EnvCredentials::new(config.api_key_env.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_blank_key_counts_as_missing() {
        assert_eq!(StaticCredentials::new(Some("  ".to_string())).api_key(), None);
        assert_eq!(StaticCredentials::new(None).api_key(), None);
        assert_eq!(
            StaticCredentials::new(Some("k".to_string())).api_key(),
            Some("k".to_string())
        );
    }

    #[test]
    fn test_env_credentials_missing_variable() {
        let source = EnvCredentials::new("LIVECORD_TEST_UNSET_KEY_7F3A");
        assert_eq!(source.api_key(), None);
        assert!(source.describe().contains("LIVECORD_TEST_UNSET_KEY_7F3A"));
    }

    #[test]
    fn test_inline_key_wins() {
        let mut config = LiveConfig::default();
        config.api_key = Some("inline".to_string());
        assert_eq!(
            credentials_from_config(&config).api_key(),
            Some("inline".to_string())
        );
    }
}

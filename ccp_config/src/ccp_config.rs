use crate::groups;

/// Primary configuration struct containing all config sections
#[derive(Debug, Clone, Default)]
pub struct CcpConfig {
    pub engine: groups::engine::ConfigValues,
    pub http: groups::http::ConfigValues,
}

impl CcpConfig {
    /// Create a new CcpConfig instance with default values and apply environment
    /// variable overrides. This is equivalent to
    /// `CcpConfig::default().with_env_overrides()`.
    pub fn new() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment variable overrides to all configuration sections.
    /// Returns a new `CcpConfig` instance with overrides applied.
    /// The group name for each section is derived from its module name.
    /// Environment variables follow the pattern: CCP_{GROUP_NAME}_{FIELD_NAME}
    pub fn with_env_overrides(mut self) -> Self {
        self.engine.apply_env_overrides();
        self.http.apply_env_overrides();
        self
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: CcpConfig = CcpConfig::new();
}

/// The process-wide configuration, read once from the environment.
/// Components that need per-instance settings accept a `CcpConfig` explicitly
/// and fall back to this.
pub fn ccp_config() -> &'static CcpConfig {
    &GLOBAL_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CcpConfig::default();
        assert_eq!(config.engine.partsize, 0);
        assert_eq!(config.engine.maxmem, 32 * 1024 * 1024);
        assert_eq!(config.engine.retry, 10);
        assert!(config.engine.tmp.is_empty());
        assert!(!config.engine.nogc);
        assert!(!config.engine.spin);
        assert!(!config.engine.nosort);
        assert_eq!(config.http.maxhttp, 24);
        assert!(!config.http.insecure);
    }

    #[test]
    fn test_env_override() {
        // Env var manipulation is process-global, so restore on exit.
        std::env::set_var("CCP_ENGINE_PARTSIZE", "65536");
        std::env::set_var("CCP_HTTP_MAXHTTP", "4");
        let config = CcpConfig::default().with_env_overrides();
        std::env::remove_var("CCP_ENGINE_PARTSIZE");
        std::env::remove_var("CCP_HTTP_MAXHTTP");

        assert_eq!(config.engine.partsize, 65536);
        assert_eq!(config.http.maxhttp, 4);
    }

    #[test]
    fn test_malformed_override_keeps_default() {
        std::env::set_var("CCP_ENGINE_RETRY", "often");
        let config = CcpConfig::default().with_env_overrides();
        std::env::remove_var("CCP_ENGINE_RETRY");

        assert_eq!(config.engine.retry, 10);
    }
}

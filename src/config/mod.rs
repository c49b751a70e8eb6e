//! Configuration management.
//!
//! All configuration is resolved once at process start and passed into the
//! engine by reference; the engine itself performs no environment lookups.

use serde::Deserialize;
use std::path::Path;

/// Main configuration for the federation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default result count when a request asks for zero.
    pub default_n_results: usize,
    /// Hard ceiling on the requested result count.
    pub max_results: usize,
    /// Fan-out execution limits.
    pub fanout: FanoutConfig,
    /// Maximum degradation level the retry ladder may reach.
    pub max_degradation_level: u8,
    /// LLM capability configuration.
    pub llm: LlmConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_n_results: 5,
            max_results: 20,
            fanout: FanoutConfig::default(),
            max_degradation_level: 3,
            llm: LlmConfig::default(),
        }
    }
}

/// Fan-out execution limits.
#[derive(Debug, Clone, Copy)]
pub struct FanoutConfig {
    /// Per-source retrieval timeout in milliseconds.
    pub per_source_timeout_ms: u64,
    /// Optional wall-clock budget for one whole fan-out round in
    /// milliseconds (0 to disable). Exceeding it fails the round as a
    /// network-class error.
    pub round_timeout_ms: u64,
    /// Cap on how many element-set options one query may broaden into.
    pub max_element_options: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: 30_000,
            round_timeout_ms: 0,
            max_element_options: 8,
        }
    }
}

/// LLM capability configuration (preprocessor and correction oracle).
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL for the chat-completions endpoint.
    pub base_url: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Default result count.
    pub default_n_results: Option<usize>,
    /// Max results.
    pub max_results: Option<usize>,
    /// Max degradation level.
    pub max_degradation_level: Option<u8>,
    /// Fan-out section.
    pub fanout: Option<ConfigFileFanout>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
}

/// Fan-out section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileFanout {
    /// Per-source timeout (ms).
    pub per_source_timeout_ms: Option<u64>,
    /// Whole-round budget (ms, 0 disables).
    pub round_timeout_ms: Option<u64>,
    /// Element-option cap.
    pub max_element_options: Option<usize>,
}

/// LLM section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Request timeout (ms).
    pub timeout_ms: Option<u64>,
    /// Connect timeout (ms).
    pub connect_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/matfed/` on macOS)
    /// 2. XDG config dir (`~/.config/matfed/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("matfed").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("matfed")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Applies environment variable overrides to the LLM section.
    ///
    /// Recognized: `MATFED_LLM_MODEL`, `MATFED_LLM_API_KEY`,
    /// `MATFED_LLM_BASE_URL`, `MATFED_LLM_TIMEOUT_MS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("MATFED_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Ok(v) = std::env::var("MATFED_LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MATFED_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("MATFED_LLM_TIMEOUT_MS") {
            if let Ok(timeout_ms) = v.parse::<u64>() {
                self.llm.timeout_ms = Some(timeout_ms);
            }
        }
        self
    }

    /// Clamps a requested result count to the configured bounds.
    ///
    /// Zero falls back to the default; anything above the ceiling is capped.
    #[must_use]
    pub const fn normalize_n_results(&self, n_results: usize) -> usize {
        if n_results == 0 {
            self.default_n_results
        } else if n_results > self.max_results {
            self.max_results
        } else {
            n_results
        }
    }

    /// Converts a `ConfigFile` to an `EngineConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(default_n_results) = file.default_n_results {
            config.default_n_results = default_n_results;
        }
        if let Some(max_results) = file.max_results {
            config.max_results = max_results;
        }
        if let Some(level) = file.max_degradation_level {
            config.max_degradation_level = level;
        }
        if let Some(fanout) = file.fanout {
            if let Some(v) = fanout.per_source_timeout_ms {
                config.fanout.per_source_timeout_ms = v;
            }
            if let Some(v) = fanout.round_timeout_ms {
                config.fanout.round_timeout_ms = v;
            }
            if let Some(v) = fanout.max_element_options {
                config.fanout.max_element_options = v;
            }
        }
        if let Some(llm) = file.llm {
            config.llm.model = llm.model;
            config.llm.api_key = llm.api_key;
            config.llm.base_url = llm.base_url;
            config.llm.timeout_ms = llm.timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
        }

        config
    }
}

use crate::bridge::NullReplyPolicy;
use crate::codec::ZeroLengthPolicy;
use crate::engine::ScriptedEngine;
use crate::errors::ConfigError;
use crate::logging::{parse_level, LogConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the file `discover` looks for
pub const CONFIG_FILE: &str = ".prolog-bridge.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub callback: CallbackConfig,

    #[serde(default)]
    pub codec: CodecConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine installation path, `argv[0]` at init
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Extra arguments appended after `-n`
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_initial_cells")]
    pub initial_heap_cells: usize,

    #[serde(default = "default_max_cells")]
    pub max_heap_cells: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Foreign predicate the engine calls to reach the managed side
    #[serde(default = "default_predicate")]
    pub predicate: String,

    #[serde(default)]
    pub null_reply: NullReplyPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    #[serde(default)]
    pub zero_length: ZeroLengthPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_false")]
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: Vec::new(),
            initial_heap_cells: default_initial_cells(),
            max_heap_cells: default_max_cells(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            predicate: default_predicate(),
            null_reply: NullReplyPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            json: false,
        }
    }
}

fn default_false() -> bool { false }
fn default_level() -> String { "info".to_string() }
fn default_predicate() -> String { "interprolog_callback".to_string() }
fn default_initial_cells() -> usize { ScriptedEngine::DEFAULT_INITIAL_CELLS }
fn default_max_cells() -> usize { ScriptedEngine::DEFAULT_MAX_CELLS }

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Find and load the config file from the current directory or parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .map(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    /// `discover` starting at `start`; defaults when nothing loads
    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(err) => {
                        tracing::warn!(path = %config_path.display(), error = %err, "ignoring config file")
                    }
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Overlay `PROLOG_BRIDGE_DEBUG` and `PROLOG_BRIDGE_ENGINE_PATH`
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("PROLOG_BRIDGE_DEBUG") {
            self.debug.enabled = parse_flag(&value).ok_or(ConfigError::InvalidValue {
                key: "PROLOG_BRIDGE_DEBUG",
                value,
            })?;
        }
        if let Ok(path) = std::env::var("PROLOG_BRIDGE_ENGINE_PATH") {
            self.engine.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn log_config(&self) -> Result<LogConfig, ConfigError> {
        let level = parse_level(&self.logging.level).ok_or_else(|| ConfigError::InvalidValue {
            key: "logging.level",
            value: self.logging.level.clone(),
        })?;
        Ok(LogConfig {
            level,
            log_path: self.logging.file.clone(),
            json_format: self.logging.json,
            show_spans: self.debug.enabled,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.callback.predicate.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "callback.predicate",
                value: self.callback.predicate.clone(),
            });
        }
        if self.engine.initial_heap_cells > self.engine.max_heap_cells {
            return Err(ConfigError::InvalidValue {
                key: "engine.initial_heap_cells",
                value: self.engine.initial_heap_cells.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

//! Frontend components
//!
//! Configuration and the command-line driver that exercise the bridge
//! against the scripted engine.

pub mod cli;
pub mod config;

pub use cli::main as cli_main;
pub use config::{BridgeConfig, CallbackConfig, CodecConfig, DebugConfig, EngineConfig, LoggingConfig};

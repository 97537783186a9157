//! # Core Module
//!
//! Shared configuration types used by the renderer and by applications that
//! embed it.

pub mod config;

pub use config::{AssetConfig, AssetPolicy, Config, ConfigError, RendererConfig, WindowConfig};

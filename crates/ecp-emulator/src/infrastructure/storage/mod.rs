//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module handles:
//!
//! - Reading the TOML configuration file from `--config` or the
//!   platform-appropriate directory.
//! - Providing defaults when no file exists (first run).
//! - Rendering the effective configuration back to TOML (`--print-config`).

pub mod config;

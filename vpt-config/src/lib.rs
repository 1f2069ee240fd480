// vpt-config/src/lib.rs
// ============================================================================
// Module: VirtualPyTest Configuration Library
// Description: Canonical config model, environment loading, and TOML overlay
//              for the Server and Host processes.
// Purpose: Single source of truth for the environment inputs named in §6.6.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! Configuration is resolved in two layers: typed defaults overlaid by an
//! optional TOML file, then overlaid again by environment variables (§6.6).
//! Nothing here talks to the network or a database; it produces a plain
//! [`VptConfig`] value that `vpt-server`/`vpt-host` use to construct their
//! runtime state.

pub mod config;

pub use config::ConfigError;
pub use config::ObjectStorageConfig;
pub use config::VptConfig;

//! # tabtrace-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`TabtraceSettings::default()`]
//! 2. **User file** — `~/.tabtrace/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `TABTRACE_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly to the components that need it;
//! there is no global settings instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, resolve_db_path, settings_path,
    tabtrace_home,
};
pub use types::*;

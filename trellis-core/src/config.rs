//! Runtime Configuration
//!
//! Settings that change how invalidations are delivered and how loudly the
//! runtime reports problems. The configuration is scoped to the current
//! execution context (thread), like the scheduler and the tracking stack.

use std::cell::RefCell;

use serde::Deserialize;

use crate::error::Result;

/// Default bound on how often one subscriber may re-enter a single flush.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Observer runtime configuration.
///
/// # Example
///
/// ```rust
/// use trellis_core::config::{self, Config};
///
/// let cfg = Config::from_json(r#"{ "async_flush": false }"#).unwrap();
/// config::set(cfg);
/// assert!(!config::get().async_flush);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch invalidations and flush them at the next tick boundary.
    ///
    /// When false, every enqueue flushes immediately and dependencies notify
    /// their subscribers in creation order.
    pub async_flush: bool,

    /// Suppress warnings that have no custom handler.
    pub silent: bool,

    /// Loop guard bound for a single flush.
    pub max_update_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_flush: true,
            silent: false,
            max_update_count: MAX_UPDATE_COUNT,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Get a copy of the active configuration.
pub fn get() -> Config {
    CONFIG.with(|cfg| cfg.borrow().clone())
}

/// Replace the active configuration.
pub fn set(config: Config) {
    CONFIG.with(|cfg| *cfg.borrow_mut() = config);
}

/// Modify the active configuration in place.
pub fn update(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|cfg| f(&mut cfg.borrow_mut()));
}

pub(crate) fn async_flush() -> bool {
    CONFIG.with(|cfg| cfg.borrow().async_flush)
}

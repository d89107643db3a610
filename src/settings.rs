//! Sampling parameters and user toggles, with persistence.
//!
//! Every setter clamps into range instead of failing. Parameter changes do not
//! reach a loaded engine by themselves; the session controller applies them on
//! the next reinitialization.

use crate::store::{KeyValueStore, keys};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::warn;

/// Allowed sampling temperature.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Allowed top-k candidate count.
pub const TOP_K_RANGE: RangeInclusive<u32> = 1..=1000;
/// Allowed nucleus sampling threshold.
pub const TOP_P_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Sampling parameters baked into an engine at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParameters {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
        }
    }
}

impl ModelParameters {
    /// Copy with every field forced into its range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            temperature: clamp_unit(self.temperature, &TEMPERATURE_RANGE),
            top_k: self.top_k.clamp(*TOP_K_RANGE.start(), *TOP_K_RANGE.end()),
            top_p: clamp_unit(self.top_p, &TOP_P_RANGE),
        }
    }
}

/// `f32::clamp` passes NaN through; map it to the lower bound.
fn clamp_unit(value: f32, range: &RangeInclusive<f32>) -> f32 {
    if value.is_nan() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

/// Clamp a signed top-k request (e.g. from a stored integer or a UI slider).
fn clamp_top_k(value: i64) -> u32 {
    let lo = i64::from(*TOP_K_RANGE.start());
    let hi = i64::from(*TOP_K_RANGE.end());
    // In range after clamping, so the cast is lossless.
    value.clamp(lo, hi) as u32
}

/// Settings that take effect on the next request without reinitialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub use_web_search: bool,
}

/// Owns the current parameters and toggles and writes each change through.
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    params: ModelParameters,
    settings: Settings,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("params", &self.params)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Restore persisted values, falling back to `defaults` per field.
    pub fn load(store: Arc<dyn KeyValueStore>, defaults: ModelParameters) -> Self {
        let defaults = defaults.clamped();
        let params = ModelParameters {
            temperature: store.get_f32(keys::TEMPERATURE).unwrap_or(defaults.temperature),
            top_k: store
                .get_i64(keys::TOP_K)
                .map(clamp_top_k)
                .unwrap_or(defaults.top_k),
            top_p: store.get_f32(keys::TOP_P).unwrap_or(defaults.top_p),
        }
        .clamped();
        let settings = Settings {
            use_web_search: store.get_bool(keys::USE_WEB_SEARCH).unwrap_or(false),
        };
        Self {
            store,
            params,
            settings,
        }
    }

    pub fn params(&self) -> ModelParameters {
        self.params
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn set_temperature(&mut self, value: f32) -> f32 {
        self.params.temperature = clamp_unit(value, &TEMPERATURE_RANGE);
        if let Err(e) = self.store.set_f32(keys::TEMPERATURE, self.params.temperature) {
            warn!("failed to persist temperature: {e}");
        }
        self.params.temperature
    }

    pub fn set_top_k(&mut self, value: i64) -> u32 {
        self.params.top_k = clamp_top_k(value);
        if let Err(e) = self.store.set_i64(keys::TOP_K, i64::from(self.params.top_k)) {
            warn!("failed to persist top_k: {e}");
        }
        self.params.top_k
    }

    pub fn set_top_p(&mut self, value: f32) -> f32 {
        self.params.top_p = clamp_unit(value, &TOP_P_RANGE);
        if let Err(e) = self.store.set_f32(keys::TOP_P, self.params.top_p) {
            warn!("failed to persist top_p: {e}");
        }
        self.params.top_p
    }

    pub fn set_use_web_search(&mut self, enabled: bool) {
        self.settings.use_web_search = enabled;
        if let Err(e) = self.store.set_bool(keys::USE_WEB_SEARCH, enabled) {
            warn!("failed to persist use_web_search: {e}");
        }
    }
}

//! Key-value persistence for settings, personalities, and history.
//!
//! Values are JSON scalars; collections are stored as JSON-encoded strings so
//! any string-capable backend (platform preferences, a file) can hold them.
//! State is read once at startup and written on every mutating operation.
//! Read failures never propagate: a value that is missing or cannot be decoded
//! is reported as absent and callers fall back to defaults.

use crate::error::{ChatError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Fixed key names.
pub mod keys {
    pub const SELECTED_PERSONALITY_ID: &str = "selected_personality_id";
    pub const CUSTOM_PERSONALITIES: &str = "custom_personalities";
    pub const TEMPERATURE: &str = "temperature";
    pub const TOP_K: &str = "top_k";
    pub const TOP_P: &str = "top_p";
    pub const USE_WEB_SEARCH: &str = "use_web_search";
    pub const CONVERSATION_HISTORY: &str = "conversation_history";
}

/// A string-keyed store of JSON scalars.
///
/// Implementations use interior mutability so a single store can be shared
/// behind an `Arc` by every component that persists through it.
pub trait KeyValueStore: Send + Sync {
    /// Raw value for `key`, if present.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, durably if the backend supports it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Storage`] when the write cannot be completed.
    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s),
            other => {
                warn!("stored value for {key} is not a string: {other}");
                None
            }
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.set(key, Value::String(value.to_owned()))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.get(key)?;
        let parsed = value.as_bool();
        if parsed.is_none() {
            warn!("stored value for {key} is not a bool: {value}");
        }
        parsed
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.set(key, Value::Bool(value))
    }

    fn get_f32(&self, key: &str) -> Option<f32> {
        let value = self.get(key)?;
        let parsed = value.as_f64().map(|v| v as f32);
        if parsed.is_none() {
            warn!("stored value for {key} is not a number: {value}");
        }
        parsed
    }

    fn set_f32(&self, key: &str, value: f32) -> Result<()> {
        let number = serde_json::Number::from_f64(f64::from(value))
            .ok_or_else(|| ChatError::Storage(format!("{key}: non-finite value {value}")))?;
        self.set(key, Value::Number(number))
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        let value = self.get(key)?;
        let parsed = value.as_i64();
        if parsed.is_none() {
            warn!("stored value for {key} is not an integer: {value}");
        }
        parsed
    }

    fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set(key, Value::from(value))
    }
}

/// Decode a JSON-encoded collection stored under `key`.
///
/// Returns `None` when the key is absent or the payload does not decode.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = store.get_string(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("cannot decode stored {key}: {e}");
            None
        }
    }
}

/// Encode `value` as JSON text and store it under `key`.
///
/// # Errors
///
/// Returns [`ChatError::Storage`] if encoding or the write fails.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| ChatError::Storage(format!("cannot encode {key}: {e}")))?;
    store.set_string(key, &raw)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process store with no durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        lock(&self.values).insert(key.to_owned(), value);
        Ok(())
    }
}

/// Store backed by a single JSON object file.
///
/// The file is read once by [`JsonFileStore::open`] and rewritten in full on
/// each `set`, via a temporary file and rename so a crash never leaves a
/// truncated document behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file starts an empty store. An unreadable or corrupt file is
    /// logged and also starts empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match read_document(&path) {
            Ok(values) => values,
            Err(e) => {
                warn!("cannot load state from {}: {e}", path.display());
                Map::new()
            }
        };
        debug!("opened state store {} ({} keys)", path.display(), values.len());
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_document(path: &Path) -> Result<Map<String, Value>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => return Err(ChatError::Storage(format!("cannot read state: {e}"))),
    };
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ChatError::Storage(format!(
            "state root is not an object: {}",
            type_name(&other)
        ))),
        Err(e) => Err(ChatError::Storage(format!("cannot parse state: {e}"))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn write_document(path: &Path, values: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ChatError::Storage(format!("cannot create state dir: {e}")))?;
    }
    let json = serde_json::to_vec_pretty(values)
        .map_err(|e| ChatError::Storage(format!("cannot serialize state: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| ChatError::Storage(format!("cannot write state: {e}")))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| ChatError::Storage(format!("cannot replace state: {e}")))?;
    Ok(())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = lock(&self.values);
        values.insert(key.to_owned(), value);
        write_document(&self.path, &values)
    }
}

//! Engine options.
//!
//! [`Options`] is the configuration record every middleware can read through
//! the context. The engine itself only looks at `call_done_on_end`; every
//! other key is caller-defined and passed through untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under which `call_done_on_end` appears in serialized options.
pub const CALL_DONE_ON_END: &str = "call_done_on_end";

/// Engine options plus arbitrary caller-defined fields.
///
/// `call_done_on_end` defaults to `true`: finalizing the response ends the
/// current chain run as if the middleware had called `done()`.
///
/// # Example
///
/// ```
/// use tessera_middleware::Options;
///
/// let defaults = Options::new().with("tenant", "acme").with("strict", true);
/// let overrides = Options::new().with_call_done_on_end(false).with("strict", false);
///
/// let merged = defaults.merged(&overrides);
/// assert!(!merged.call_done_on_end());
/// assert_eq!(merged.get_as::<String>("tenant").as_deref(), Some("acme"));
/// assert_eq!(merged.get_as::<bool>("strict"), Some(false));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_done_on_end: Option<bool>,

    #[serde(flatten)]
    custom: Map<String, Value>,
}

impl Options {
    /// Creates options with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether finalizing the response aborts the running chain.
    #[must_use]
    pub fn call_done_on_end(&self) -> bool {
        self.call_done_on_end.unwrap_or(true)
    }

    /// Sets `call_done_on_end`.
    #[must_use]
    pub fn with_call_done_on_end(mut self, enabled: bool) -> Self {
        self.call_done_on_end = Some(enabled);
        self
    }

    /// Sets `call_done_on_end` in place.
    pub fn set_call_done_on_end(&mut self, enabled: bool) {
        self.call_done_on_end = Some(enabled);
    }

    /// Adds a caller-defined field.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a caller-defined field, returning the previous value.
    ///
    /// The `call_done_on_end` key is routed to the typed field when the value
    /// is a boolean.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();

        if key == CALL_DONE_ON_END {
            if let Value::Bool(enabled) = value {
                return self
                    .call_done_on_end
                    .replace(enabled)
                    .map(Value::Bool);
            }
        }
        self.custom.insert(key, value)
    }

    /// Returns a caller-defined field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.custom.get(key)
    }

    /// Returns a caller-defined field deserialized into `T`.
    ///
    /// `None` if the key is missing or does not fit `T`.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.custom
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    /// Returns all caller-defined fields.
    #[must_use]
    pub fn custom(&self) -> &Map<String, Value> {
        &self.custom
    }

    /// Shallow-merges `overrides` on top of `self`.
    ///
    /// Every key set in `overrides` wins; keys only present in `self` are
    /// kept. Nested values are replaced, not merged.
    #[must_use]
    pub fn merged(mut self, overrides: &Options) -> Options {
        if let Some(enabled) = overrides.call_done_on_end {
            self.call_done_on_end = Some(enabled);
        }
        for (key, value) in &overrides.custom {
            self.custom.insert(key.clone(), value.clone());
        }
        self
    }
}

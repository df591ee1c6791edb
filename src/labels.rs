//! Descriptive metadata for operations and tasks.
//!
//! Labels never influence scheduling. They exist so that the introspection
//! feed (and whatever renders it) can tell tasks apart.

use indexmap::IndexMap;
use serde::Serialize;

use std::fmt;

/// A display-safe label value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LabelValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for LabelValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for LabelValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for LabelValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<usize> for LabelValue {
    fn from(value: usize) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for LabelValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// An optional name plus an ordered set of key/value labels.
///
/// Insertion order is preserved so that the inspector shows labels in the
/// order they were attached.
///
/// # Examples
///
/// ```rust,ignore
/// let labels = Labels::named("fetch")
///     .with("url", "https://example.com")
///     .with("attempt", 2);
///
/// assert_eq!(labels.name(), Some("fetch"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Labels {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "labels")]
    values: IndexMap<String, LabelValue>,
}

impl Labels {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a label set carrying only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            values: IndexMap::new(),
        }
    }

    /// Adds (or replaces) the label `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<LabelValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets the name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Adds (or replaces) the label `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<LabelValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&LabelValue> {
        self.values.get(key)
    }

    /// Iterates over the labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` if there is neither a name nor any label.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.values.is_empty()
    }

    /// Layers `overrides` on top of `self`.
    ///
    /// A name in `overrides` replaces this name; labels present in both
    /// take the overriding value and keep their original position.
    pub fn merge(mut self, overrides: Labels) -> Self {
        if let Some(name) = overrides.name {
            self.name = Some(name);
        }
        self.values.extend(overrides.values);
        self
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("<anonymous>"))?;
        for (i, (key, value)) in self.iter().enumerate() {
            let sep = if i == 0 { " {" } else { ", " };
            write!(f, "{sep}{key}: {value}")?;
        }
        if !self.values.is_empty() {
            f.write_str("}")?;
        }
        Ok(())
    }
}

//! Form field values collected by the binder.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field name to values, in the order they appeared for each name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues {
    inner: HashMap<String, Vec<String>>,
}

impl FormValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`, keeping earlier values.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(name.into()).or_default().push(value.into());
    }

    /// First value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values for `name`, oldest first.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Number of distinct field names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<String, Vec<String>> {
        self.inner
    }
}

impl From<HashMap<String, Vec<String>>> for FormValues {
    fn from(inner: HashMap<String, Vec<String>>) -> Self {
        Self { inner }
    }
}

//! Format identifier to converter mapping.
//!
//! The registry is filled once at start-up by explicit `register` calls and
//! is read-only afterwards, so concurrent `resolve` calls need no locking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::convert::Converter;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("a converter is already registered for format `{0}`")]
  Duplicate(String),

  #[error("no converter is registered for format `{0}`")]
  UnknownFormat(String),
}

/// One registered converter.
#[derive(Clone)]
pub struct ConverterDescriptor {
  pub format_id: String,
  pub priority: i64,
  pub instance: Arc<dyn Converter>,
}

impl fmt::Debug for ConverterDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ConverterDescriptor")
      .field("format_id", &self.format_id)
      .field("priority", &self.priority)
      .field("extension", &self.instance.output_extension())
      .finish()
  }
}

#[derive(Debug, Default)]
pub struct ConverterRegistry {
  converters: BTreeMap<String, ConverterDescriptor>,
}

impl ConverterRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `converter` under `format_id` with the converter's own priority.
  pub fn register(&mut self, format_id: impl Into<String>, converter: Arc<dyn Converter>) -> Result<(), RegistryError> {
    let priority = converter.priority();
    self.register_with_priority(format_id, priority, converter)
  }

  pub fn register_with_priority(
    &mut self,
    format_id: impl Into<String>,
    priority: i64,
    converter: Arc<dyn Converter>,
  ) -> Result<(), RegistryError> {
    let format_id = format_id.into();
    if self.converters.contains_key(&format_id) {
      return Err(RegistryError::Duplicate(format_id));
    }
    self.converters.insert(
      format_id.clone(),
      ConverterDescriptor {
        format_id,
        priority,
        instance: converter,
      },
    );
    Ok(())
  }

  pub fn resolve(&self, format_id: &str) -> Result<&ConverterDescriptor, RegistryError> {
    self
      .converters
      .get(format_id)
      .ok_or_else(|| RegistryError::UnknownFormat(format_id.to_string()))
  }

  pub fn contains(&self, format_id: &str) -> bool {
    self.converters.contains_key(format_id)
  }

  /// Every descriptor, ordered by ascending priority then format id.
  ///
  /// For listings only; execution order comes from the build matrix.
  pub fn list_all(&self) -> Vec<&ConverterDescriptor> {
    let mut all: Vec<_> = self.converters.values().collect();
    all.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.format_id.cmp(&b.format_id)));
    all
  }

  pub fn format_ids(&self) -> impl Iterator<Item = &str> {
    self.converters.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.converters.len()
  }

  pub fn is_empty(&self) -> bool {
    self.converters.is_empty()
  }
}

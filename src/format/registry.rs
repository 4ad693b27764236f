//! Explicit set of input formats available to a session

use super::InputFormat;
use std::sync::Arc;

/// Input formats in registration order; earlier formats win score ties on fallback paths
#[derive(Debug, Default, Clone)]
pub struct FormatRegistry {
    formats: Vec<Arc<dyn InputFormat>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F: InputFormat + 'static>(&mut self, format: F) -> &mut Self {
        self.formats.push(Arc::new(format));
        self
    }

    pub fn register_shared(&mut self, format: Arc<dyn InputFormat>) -> &mut Self {
        self.formats.push(format);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn InputFormat>> {
        self.formats.iter()
    }

    /// Look a format up by name
    pub fn find(&self, name: &str) -> Option<&Arc<dyn InputFormat>> {
        self.formats.iter().find(|f| f.info().name == name)
    }

    /// Formats carrying a single raw elementary stream
    pub fn elementary(&self) -> impl Iterator<Item = &Arc<dyn InputFormat>> {
        self.formats
            .iter()
            .filter(|f| f.info().elementary_codec.is_some())
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

//! Lookup of converters by file extension.

use std::path::Path;
use std::sync::Arc;

use crate::converter::Converter;

/// The converters available to a run, in registration order.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter. Earlier registrations win extension clashes.
    pub fn register<C: Converter + 'static>(&mut self, converter: C) {
        self.converters.push(Arc::new(converter));
    }

    /// Returns the converter handling `path`, if any.
    pub fn find(&self, path: &Path) -> Option<&Arc<dyn Converter>> {
        self.position(path).map(|i| &self.converters[i])
    }

    /// Index of the converter handling `path`.
    pub(crate) fn position(&self, path: &Path) -> Option<usize> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        self.converters.iter().position(|converter| {
            converter
                .extensions()
                .iter()
                .any(|ext| matches_extension(&name, ext))
        })
    }

    pub(crate) fn get(&self, index: usize) -> &Arc<dyn Converter> {
        &self.converters[index]
    }

    /// Number of registered converters.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Names of the registered converters.
    pub fn names(&self) -> Vec<&str> {
        self.converters.iter().map(|c| c.name()).collect()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// `name` must already be lowercase. Compound extensions like `tar.gz` match
/// on the whole suffix.
fn matches_extension(name: &str, ext: &str) -> bool {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() || name.len() <= ext.len() {
        return false;
    }
    let split = name.len() - ext.len();
    name.is_char_boundary(split)
        && name[..split].ends_with('.')
        && name[split..].eq_ignore_ascii_case(ext)
}

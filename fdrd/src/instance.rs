//! Tracing-instance data model and registry.

use crate::config::{Directive, InstanceFields};

/// Default free-space floor, in percent of the output filesystem.
pub const MIN_FREE_DEFAULT: u8 = 5;

/// Sentinel max-file-size meaning "no size quota".
pub const MAX_SIZE_UNBOUNDED: u64 = u64::MAX;

/// An independently configured capture unit.
///
/// Created the moment an `instance` directive is parsed; every following
/// directive in the same file attaches to it until the next `instance`
/// directive or end of file. Owned exclusively by its supervisor context
/// once loading completes.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    /// Directives in file order; execution order matters.
    pub directives: Vec<Directive>,
    /// ftrace ring-buffer size; `None` accepts the platform default.
    pub buffer_size: Option<u64>,
    pub max_file_size: u64,
    pub min_free_percent: u8,
}

impl Instance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            directives: Vec::new(),
            buffer_size: None,
            max_file_size: MAX_SIZE_UNBOUNDED,
            min_free_percent: MIN_FREE_DEFAULT,
        }
    }

    /// Apply instance-level fields implied by a parsed directive.
    pub(crate) fn apply_fields(&mut self, fields: &InstanceFields) {
        if let Some(size) = fields.buffer_size {
            self.buffer_size = Some(size);
        }
        if let Some(size) = fields.max_file_size {
            self.max_file_size = size;
        }
        if let Some(pct) = fields.min_free_percent {
            self.min_free_percent = pct;
        }
    }
}

/// Ordered collection of all instances across all loaded config files.
///
/// Append-only during load, read-only afterwards. Instances are not
/// deduplicated by name; colliding names are a configuration hazard the
/// daemon does not police.
#[derive(Debug, Default)]
pub struct Registry {
    instances: Vec<Instance>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    pub fn last_mut(&mut self) -> Option<&mut Instance> {
        self.instances.last_mut()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Consume the registry, handing each instance to its supervisor.
    pub fn into_instances(self) -> Vec<Instance> {
        self.instances
    }
}

//! Section registry
//!
//! Provides [`SectionRegistry`], the immutable map of section configurations
//! built once at startup and injected into the engine.

use crate::error::ConfigurationError;
use dh_model::{BlockingError, Record, SaveWarning, SectionKey, ValidationResult};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Two-tier validators supplied by domain configuration
pub trait SectionValidator: Send + Sync + fmt::Debug {
    /// Blocking tier; any error prevents persistence
    fn database(&self, record: &Record) -> Vec<BlockingError>;

    /// Warning tier; never prevents persistence
    fn save(&self, record: &Record) -> Vec<SaveWarning>;
}

type DatabaseFn = dyn Fn(&Record) -> Vec<BlockingError> + Send + Sync;
type SaveFn = dyn Fn(&Record) -> Vec<SaveWarning> + Send + Sync;
type EmptyFactory = dyn Fn() -> Record + Send + Sync;

/// Validator assembled from two closures
pub struct FnValidator {
    database: Box<DatabaseFn>,
    save: Box<SaveFn>,
}

impl FnValidator {
    /// Create from tier closures
    pub fn new<D, S>(database: D, save: S) -> Self
    where
        D: Fn(&Record) -> Vec<BlockingError> + Send + Sync + 'static,
        S: Fn(&Record) -> Vec<SaveWarning> + Send + Sync + 'static,
    {
        Self {
            database: Box::new(database),
            save: Box::new(save),
        }
    }
}

impl fmt::Debug for FnValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnValidator").finish_non_exhaustive()
    }
}

impl SectionValidator for FnValidator {
    fn database(&self, record: &Record) -> Vec<BlockingError> {
        (self.database)(record)
    }

    fn save(&self, record: &Record) -> Vec<SaveWarning> {
        (self.save)(record)
    }
}

/// Shape of a section, carrying its row identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// One record edited as a form
    Single {
        /// Field holding the record's id
        id_field: &'static str,
    },
    /// Ordered rows edited as a grid
    Collection {
        /// Field holding each row's id
        id_field: &'static str,
        /// Numeric field giving the physical ordering (e.g. depth)
        order_by: Option<&'static str>,
    },
}

impl SectionKind {
    /// Id field of the section's records
    #[inline]
    #[must_use]
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Single { id_field } | Self::Collection { id_field, .. } => *id_field,
        }
    }

    /// Whether this is a collection section
    #[inline]
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection { .. })
    }
}

/// Static configuration of one section
pub struct SectionConfig {
    key: SectionKey,
    kind: SectionKind,
    label: String,
    required: bool,
    validators: Arc<dyn SectionValidator>,
    empty: Arc<EmptyFactory>,
}

impl SectionConfig {
    /// Start building a configuration
    #[must_use]
    pub fn builder(key: impl Into<SectionKey>, kind: SectionKind) -> SectionConfigBuilder {
        SectionConfigBuilder {
            key: key.into(),
            kind,
            label: None,
            required: false,
            validators: None,
            empty: None,
        }
    }

    /// Section key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &SectionKey {
        &self.key
    }

    /// Section shape
    #[inline]
    #[must_use]
    pub fn kind(&self) -> SectionKind {
        self.kind
    }

    /// Id field of the section's records
    #[inline]
    #[must_use]
    pub fn id_field(&self) -> &'static str {
        self.kind.id_field()
    }

    /// Display label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Single section that must exist for every aggregate
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Fresh empty record
    #[must_use]
    pub fn empty_record(&self) -> Record {
        (self.empty)()
    }

    /// Run both validator tiers against a record
    #[must_use]
    pub fn validate(&self, record: &Record) -> ValidationResult {
        let errors = self.validators.database(record);
        let warnings = self.validators.save(record);
        ValidationResult::from_tiers(errors, warnings)
    }
}

impl fmt::Debug for SectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectionConfig")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("required", &self.required)
            .field("validators", &self.validators)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SectionConfig`]
pub struct SectionConfigBuilder {
    key: SectionKey,
    kind: SectionKind,
    label: Option<String>,
    required: bool,
    validators: Option<Arc<dyn SectionValidator>>,
    empty: Option<Arc<EmptyFactory>>,
}

impl SectionConfigBuilder {
    /// Display label (defaults to the key)
    #[inline]
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Synthesize a default record when the aggregate has none
    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Two-tier validators
    #[inline]
    #[must_use]
    pub fn validators(mut self, validators: impl SectionValidator + 'static) -> Self {
        self.validators = Some(Arc::new(validators));
        self
    }

    /// Empty-record factory
    #[inline]
    #[must_use]
    pub fn empty_record(mut self, factory: impl Fn() -> Record + Send + Sync + 'static) -> Self {
        self.empty = Some(Arc::new(factory));
        self
    }

    /// Finish, refusing incomplete configuration
    ///
    /// # Errors
    /// - `ConfigurationError::EmptyIdField` if the kind's id field is blank
    /// - `ConfigurationError::MissingValidators` / `MissingEmptyFactory`
    pub fn build(self) -> Result<SectionConfig, ConfigurationError> {
        if self.kind.id_field().trim().is_empty() {
            return Err(ConfigurationError::EmptyIdField(self.key));
        }
        let Some(validators) = self.validators else {
            return Err(ConfigurationError::MissingValidators(self.key));
        };
        let Some(empty) = self.empty else {
            return Err(ConfigurationError::MissingEmptyFactory(self.key));
        };

        Ok(SectionConfig {
            label: self.label.unwrap_or_else(|| self.key.to_string()),
            key: self.key,
            kind: self.kind,
            required: self.required,
            validators,
            empty,
        })
    }
}

/// Immutable registry of section configurations
#[derive(Debug, Clone, Default)]
pub struct SectionRegistry {
    sections: IndexMap<SectionKey, Arc<SectionConfig>>,
}

impl SectionRegistry {
    /// Start building a registry
    #[inline]
    #[must_use]
    pub fn builder() -> SectionRegistryBuilder {
        SectionRegistryBuilder::default()
    }

    /// Configuration for a key
    ///
    /// # Errors
    /// `ConfigurationError::UnknownSection` if nothing is registered under `key`
    pub fn get(&self, key: &SectionKey) -> Result<&Arc<SectionConfig>, ConfigurationError> {
        self.sections
            .get(key)
            .ok_or_else(|| ConfigurationError::UnknownSection(key.clone()))
    }

    /// Id field used by row operations on `key`
    ///
    /// # Errors
    /// - `ConfigurationError::UnknownSection` for unregistered keys
    /// - `ConfigurationError::NoRowIdField` for single-record sections
    pub fn row_id_field(&self, key: &SectionKey) -> Result<&'static str, ConfigurationError> {
        match self.get(key)?.kind() {
            SectionKind::Collection { id_field, .. } => Ok(id_field),
            SectionKind::Single { .. } => Err(ConfigurationError::NoRowIdField(key.clone())),
        }
    }

    /// Check if a key is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &SectionKey) -> bool {
        self.sections.contains_key(key)
    }

    /// Registered keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &SectionKey> {
        self.sections.keys()
    }

    /// Iterate configurations in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SectionConfig>> {
        self.sections.values()
    }

    /// Number of sections
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Check if the registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Builder for [`SectionRegistry`]
#[derive(Debug, Default)]
pub struct SectionRegistryBuilder {
    sections: IndexMap<SectionKey, Arc<SectionConfig>>,
}

impl SectionRegistryBuilder {
    /// Add a section
    ///
    /// # Errors
    /// `ConfigurationError::DuplicateSection` if the key is already taken
    pub fn register(mut self, config: SectionConfig) -> Result<Self, ConfigurationError> {
        if self.sections.contains_key(config.key()) {
            return Err(ConfigurationError::DuplicateSection(config.key().clone()));
        }
        self.sections.insert(config.key().clone(), Arc::new(config));
        Ok(self)
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> SectionRegistry {
        tracing::debug!(sections = self.sections.len(), "section registry built");
        SectionRegistry {
            sections: self.sections,
        }
    }
}

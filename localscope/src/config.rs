//! Guard configuration.
//!
//! A [`ScopeConfig`] is resolved once by [`ScopeConfigBuilder::build`] and is
//! immutable afterwards; every guarded call reads it without further
//! validation.
//!
//! # Example
//!
//! ```
//! use localscope::ScopeConfig;
//! use localscope_runtime::BuiltinType;
//!
//! let config = ScopeConfig::builder()
//!     .allow_names("np scipy")
//!     .allow_type(BuiltinType::Int)
//!     .build()
//!     .unwrap();
//! assert!(config.allows("np"));
//! assert!(!config.allow_closure());
//! ```

use crate::error::ConfigError;
use localscope_runtime::{TypeSpec, Value};
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether a bound value may enter the scope.
pub type ValuePredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Immutable guard configuration.
#[derive(Clone, Default)]
pub struct ScopeConfig {
    /// Names permitted regardless of their binding.
    allow: FxHashSet<Arc<str>>,
    /// Permit every free variable captured from an enclosing function.
    allow_closure: bool,
    /// Names bound to instances of these types are permitted.
    allow_types: Vec<TypeSpec>,
    /// Names bound to values accepted by this predicate are permitted.
    predicate: Option<ValuePredicate>,
}

impl ScopeConfig {
    pub fn builder() -> ScopeConfigBuilder {
        ScopeConfigBuilder::default()
    }

    /// Nothing beyond parameters and builtins is permitted.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Modules, functions and classes may enter the scope.
    pub fn mfc() -> Self {
        Self {
            predicate: Some(Arc::new(|value: &Value| {
                value.is_module() || value.is_function() || value.is_class()
            })),
            ..Self::default()
        }
    }

    /// Whether `name` is explicitly allowed.
    #[inline]
    pub fn allows(&self, name: &str) -> bool {
        self.allow.contains(name)
    }

    /// Explicitly allowed names, sorted.
    pub fn allowed_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.allow.iter().map(|name| &**name).collect();
        names.sort_unstable();
        names
    }

    #[inline]
    pub fn allow_closure(&self) -> bool {
        self.allow_closure
    }

    #[inline]
    pub fn allow_types(&self) -> &[TypeSpec] {
        &self.allow_types
    }

    #[inline]
    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// Whether a name currently bound to `value` is permitted by value.
    pub fn permits_value(&self, value: &Value) -> bool {
        self.allow_types.iter().any(|ty| ty.matches(value))
            || self.predicate.as_ref().is_some_and(|accept| accept(value))
    }
}

impl fmt::Debug for ScopeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.allow_types.iter().map(TypeSpec::name).collect();
        f.debug_struct("ScopeConfig")
            .field("allow", &self.allowed_names())
            .field("allow_closure", &self.allow_closure)
            .field("allow_types", &types)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`ScopeConfig`]. Errors are reported by [`build`](Self::build).
#[derive(Default)]
pub struct ScopeConfigBuilder {
    allow: Vec<Arc<str>>,
    allow_closure: bool,
    allow_types: Vec<TypeSpec>,
    predicate: Option<ValuePredicate>,
    error: Option<ConfigError>,
}

impl ScopeConfigBuilder {
    /// Allow one name.
    pub fn allow(mut self, name: impl Into<Arc<str>>) -> Self {
        self.allow.push(name.into());
        self
    }

    /// Allow several names.
    pub fn allow_all<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<str>>,
    {
        self.allow.extend(names.into_iter().map(Into::into));
        self
    }

    /// Allow the whitespace-separated names in `names`.
    pub fn allow_names(self, names: &str) -> Self {
        self.allow_all(names.split_whitespace())
    }

    pub fn allow_closure(mut self, allow: bool) -> Self {
        self.allow_closure = allow;
        self
    }

    /// Permit names bound to instances of `ty`.
    pub fn allow_type(mut self, ty: impl Into<TypeSpec>) -> Self {
        self.allow_types.push(ty.into());
        self
    }

    /// Permit names bound to instances of the type object `value`.
    ///
    /// `value` must be a type or class; anything else fails the build with
    /// [`ConfigError::NotAType`].
    pub fn allow_type_value(mut self, value: &Value) -> Self {
        match value.as_type() {
            Some(ty) => self.allow_types.push(ty),
            None => {
                self.error
                    .get_or_insert(ConfigError::NotAType(value.to_string().into()));
            }
        }
        self
    }

    /// Permit names whose bound value satisfies `predicate`.
    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<ScopeConfig, ConfigError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(bad) = self.allow.iter().find(|name| !is_identifier(name)) {
            return Err(ConfigError::InvalidName(bad.clone()));
        }
        Ok(ScopeConfig {
            allow: self.allow.into_iter().collect(),
            allow_closure: self.allow_closure,
            allow_types: self.allow_types,
            predicate: self.predicate,
        })
    }
}

/// Identifier check: a letter or underscore, then letters, digits or underscores.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use localscope_runtime::{BuiltinType, Class, Module};

    #[test]
    fn test_default_is_strict() {
        let config = ScopeConfig::default();
        assert!(config.allowed_names().is_empty());
        assert!(!config.allow_closure());
        assert!(!config.has_predicate());
        assert!(!config.permits_value(&Value::Module(Module::new("math"))));
    }

    #[test]
    fn test_allow_names_splits_whitespace() {
        let config = ScopeConfig::builder()
            .allow_names("  alpha beta\tgamma\n")
            .allow("delta")
            .build()
            .unwrap();
        assert_eq!(config.allowed_names(), vec!["alpha", "beta", "delta", "gamma"]);
    }

    #[test]
    fn test_invalid_name() {
        let err = ScopeConfig::builder().allow("not-a-name").build().unwrap_err();
        assert_eq!(err, ConfigError::InvalidName("not-a-name".into()));

        assert!(ScopeConfig::builder().allow("").build().is_err());
        assert!(ScopeConfig::builder().allow("1x").build().is_err());
        assert!(ScopeConfig::builder().allow("_private").build().is_ok());
    }

    #[test]
    fn test_allow_type_value() {
        let config = ScopeConfig::builder()
            .allow_type_value(&Value::Type(BuiltinType::Int))
            .build()
            .unwrap();
        assert!(config.permits_value(&Value::Int(3)));
        assert!(!config.permits_value(&Value::str("3")));

        let err = ScopeConfig::builder()
            .allow_type_value(&Value::Int(3))
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::NotAType("3".into()));
    }

    #[test]
    fn test_predicate() {
        let config = ScopeConfig::builder()
            .predicate(|value| value.as_str().is_some())
            .build()
            .unwrap();
        assert!(config.permits_value(&Value::str("hello")));
        assert!(!config.permits_value(&Value::Int(1)));
    }

    #[test]
    fn test_mfc_preset() {
        let config = ScopeConfig::mfc();
        assert!(config.permits_value(&Value::Module(Module::new("math"))));
        assert!(config.permits_value(&Value::Class(Class::new("Model"))));
        assert!(config.permits_value(&Value::Type(BuiltinType::Int)));
        assert!(!config.permits_value(&Value::Int(1)));
    }
}

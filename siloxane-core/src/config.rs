use serde::{Deserialize, Serialize};

use crate::error::{GraphResult, HookError};
use crate::hooks::{Hooks, TypeRegistry};
use crate::value::{Node, ObjectRef, Value};

pub const DEFAULT_GENERATED_ID_PREFIX: &str = "__";
pub const DEFAULT_ADMIN_PROPERTY: &str = "__odb";
pub const DEFAULT_TYPE_PROPERTY: &str = "type";

/// Name-based store settings.
///
/// Everything here is plain data, so it can live in a TOML file:
///
/// ```toml
/// generated_id_prefix = "gen-"
/// id_property = "myId"
/// type_getter = "getType"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix that marks ids generated by the store.
    pub generated_id_prefix: String,
    /// Key of the admin metadata inside snapshot records.
    pub admin_property: String,
    /// Name of a function property returning an object's id.
    pub id_getter: Option<String>,
    /// Name of a property holding an object's id.
    pub id_property: Option<String>,
    /// Name of a function property returning an object's type.
    pub type_getter: Option<String>,
    /// Name of a property holding an object's type.
    pub type_property: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            generated_id_prefix: DEFAULT_GENERATED_ID_PREFIX.to_string(),
            admin_property: DEFAULT_ADMIN_PROPERTY.to_string(),
            id_getter: None,
            id_property: None,
            type_getter: None,
            type_property: None,
        }
    }
}

impl StoreConfig {
    pub fn from_toml_str(content: &str) -> GraphResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The type property in effect: `"type"` unless a type getter or an
    /// explicit type property is configured.
    pub fn effective_type_property(&self) -> Option<&str> {
        match (&self.type_property, &self.type_getter) {
            (Some(property), _) => Some(property.as_str()),
            (None, None) => Some(DEFAULT_TYPE_PROPERTY),
            (None, Some(_)) => None,
        }
    }
}

/// Full store configuration: settings, hooks and the type registry.
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub config: StoreConfig,
    pub hooks: Hooks,
    pub registry: TypeRegistry,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: StoreConfig) -> Self {
        StoreOptions {
            config,
            ..Self::default()
        }
    }

    pub fn generated_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.generated_id_prefix = prefix.into();
        self
    }

    pub fn admin_property(mut self, name: impl Into<String>) -> Self {
        self.config.admin_property = name.into();
        self
    }

    pub fn id_getter(mut self, name: impl Into<String>) -> Self {
        self.config.id_getter = Some(name.into());
        self
    }

    pub fn id_property(mut self, name: impl Into<String>) -> Self {
        self.config.id_property = Some(name.into());
        self
    }

    pub fn type_getter(mut self, name: impl Into<String>) -> Self {
        self.config.type_getter = Some(name.into());
        self
    }

    pub fn type_property(mut self, name: impl Into<String>) -> Self {
        self.config.type_property = Some(name.into());
        self
    }

    /// Installs a factory for declared types; it takes precedence over the registry.
    pub fn create_object(
        mut self,
        f: impl Fn(&str) -> Result<Node, HookError> + 'static,
    ) -> Self {
        self.hooks.set_create_object(f);
        self
    }

    /// Installs a per-property filter consulted during serialization.
    pub fn check_insertion(
        mut self,
        f: impl Fn(&ObjectRef, &str, &Value) -> Result<bool, HookError> + 'static,
    ) -> Self {
        self.hooks.set_check_insertion(f);
        self
    }

    /// Registers a blank-instance constructor for a declared type.
    pub fn register_type(
        mut self,
        type_name: impl Into<String>,
        blank: impl Fn() -> Node + 'static,
    ) -> Self {
        self.registry.register(type_name, blank);
        self
    }
}

impl std::fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreOptions")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("registry", &self.registry)
            .finish()
    }
}

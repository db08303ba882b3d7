use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::HookError;
use crate::value::{Node, ObjectRef, Value};

/// Builds an instance of a declared type during deserialization.
pub type CreateObject = Rc<dyn Fn(&str) -> Result<Node, HookError>>;

/// Decides whether `owner[property] = value` is written into a snapshot.
pub type CheckInsertion = Rc<dyn Fn(&ObjectRef, &str, &Value) -> Result<bool, HookError>>;

/// Callbacks consulted by the serializer and the deserializer.
#[derive(Clone, Default)]
pub struct Hooks {
    create_object: Option<CreateObject>,
    check_insertion: Option<CheckInsertion>,
}

impl Hooks {
    pub fn set_create_object(&mut self, f: impl Fn(&str) -> Result<Node, HookError> + 'static) {
        self.create_object = Some(Rc::new(f));
    }

    pub fn set_check_insertion(
        &mut self,
        f: impl Fn(&ObjectRef, &str, &Value) -> Result<bool, HookError> + 'static,
    ) {
        self.check_insertion = Some(Rc::new(f));
    }

    pub fn create_object(&self) -> Option<&CreateObject> {
        self.create_object.as_ref()
    }

    pub fn check_insertion(&self) -> Option<&CheckInsertion> {
        self.check_insertion.as_ref()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("create_object", &self.create_object.is_some())
            .field("check_insertion", &self.check_insertion.is_some())
            .finish()
    }
}

/// Maps declared type names to blank-instance constructors.
///
/// A constructor prepares the node the deserializer fills in: its shape and
/// any function properties the type carries. It must not set data fields,
/// they are overwritten from the snapshot.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    constructors: IndexMap<String, Rc<dyn Fn() -> Node>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, blank: impl Fn() -> Node + 'static) {
        self.constructors.insert(type_name.into(), Rc::new(blank));
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Returns a blank instance of the type, or `None` if it is not registered.
    pub fn blank(&self, type_name: &str) -> Option<Node> {
        self.constructors.get(type_name).map(|blank| blank())
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}

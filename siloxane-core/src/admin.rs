use indexmap::IndexSet;

use crate::config::StoreConfig;
use crate::error::{GraphError, GraphResult};
use crate::ids::IdSpace;
use crate::value::{Node, ObjectRef, Value};

/// Per-object bookkeeping kept by the store.
///
/// `id` and `type_name` never change once assigned. `reference_properties` is
/// recomputed on every serialize pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminData {
    pub id: String,
    pub type_name: String,
    pub reference_properties: IndexSet<String>,
}

impl AdminData {
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        AdminData {
            id: id.into(),
            type_name: type_name.into(),
            reference_properties: IndexSet::new(),
        }
    }
}

/// Assigns ids and types to composite values entering the store.
pub(crate) struct Resolver<'a> {
    pub config: &'a StoreConfig,
    pub ids: &'a mut IdSpace,
}

impl Resolver<'_> {
    /// Ensures `obj` carries admin data and returns a copy of it.
    ///
    /// An id or type already assigned is kept; `explicit` only applies to
    /// objects seen for the first time. Falls back to a generated id.
    pub fn attach(&mut self, obj: &ObjectRef, explicit: Option<&str>) -> GraphResult<AdminData> {
        if let Some(admin) = &obj.borrow().admin {
            return Ok(admin.clone());
        }
        let (id, type_name) = {
            let node = obj.borrow();
            (self.derive_id(&node, explicit)?, self.derive_type(&node)?)
        };
        let id = match id {
            Some(id) => id,
            None => self.ids.generate(),
        };
        log::trace!("attached admin data: id={id} type={type_name}");
        let admin = AdminData::new(id, type_name);
        obj.borrow_mut().admin = Some(admin.clone());
        Ok(admin)
    }

    /// Id without falling back to generation: explicit argument, then the id
    /// getter, then the id property.
    pub fn derive_id(&self, node: &Node, explicit: Option<&str>) -> GraphResult<Option<String>> {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return Ok(Some(id.to_string()));
        }
        if let Some(getter) = &self.config.id_getter {
            if let Some(result) = node.invoke(getter) {
                if let Some(id) = id_from(result.map_err(GraphError::Hook)?) {
                    return Ok(Some(id));
                }
            }
        }
        if let Some(property) = &self.config.id_property {
            if let Some(id) = id_from(node.get(property)) {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Type from the type getter, then the type property, then the structure.
    pub fn derive_type(&self, node: &Node) -> GraphResult<String> {
        if let Some(getter) = &self.config.type_getter {
            if let Some(result) = node.invoke(getter) {
                if let Some(type_name) = type_from(result.map_err(GraphError::Hook)?) {
                    return Ok(type_name);
                }
            }
        }
        if let Some(property) = self.config.effective_type_property() {
            if let Some(type_name) = type_from(node.get(property)) {
                return Ok(type_name);
            }
        }
        Ok(node.structural_type().to_string())
    }
}

fn id_from(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn type_from(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    }
}

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use serde_json::Number;

use crate::admin::AdminData;
use crate::error::HookError;

/// Structural type name of keyed objects.
pub const OBJECT_TYPE: &str = "object";
/// Structural type name of ordered lists.
pub const LIST_TYPE: &str = "list";

/// A scalar as it appears in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// Converts a JSON value, returning `None` for arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
            serde_json::Value::Number(n) => Some(Scalar::Number(n.clone())),
            serde_json::Value::String(s) => Some(Scalar::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Null => serde_json::Value::Null,
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Number(n) => serde_json::Value::Number(n.clone()),
            Scalar::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Returns the string content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A native callable attached to an object as a property.
///
/// Functions are how objects expose capabilities such as an id getter.
/// They are never written into a snapshot.
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&Node) -> Result<Value, HookError>>);

impl Function {
    pub fn new(f: impl Fn(&Node) -> Result<Value, HookError> + 'static) -> Self {
        Function(Rc::new(f))
    }

    /// Invokes the function with the node that owns it as receiver.
    pub fn call(&self, receiver: &Node) -> Result<Value, HookError> {
        (self.0)(receiver)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function(..)")
    }
}

/// A value managed by the graph store.
///
/// Scalars are copied by value. `Object` holds a shared handle, so two
/// properties holding clones of the same `ObjectRef` point to one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// No value. Distinct from `Null` and never written into a snapshot.
    #[default]
    Absent,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// A keyed object or an ordered list.
    Object(ObjectRef),
    Function(Function),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Absent => "absent",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) => obj.borrow().structural_type(),
            Value::Function(_) => "function",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Returns the snapshot form of a non-absent scalar.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => Some(Scalar::Number(n.clone())),
            Value::String(s) => Some(Scalar::String(s.clone())),
            Value::Absent | Value::Object(_) | Value::Function(_) => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(Number::from(n))
                }
            }
        )*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<f64> for Value {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

/// The layout of a composite value.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Keyed properties in insertion order.
    Object(IndexMap<String, Value>),
    /// Ordered elements, addressed by decimal index.
    List(Vec<Value>),
}

/// A composite value together with the store's bookkeeping for it.
#[derive(Debug, Clone)]
pub struct Node {
    shape: Shape,
    pub(crate) admin: Option<AdminData>,
}

impl Node {
    pub fn object() -> Self {
        Node {
            shape: Shape::Object(IndexMap::new()),
            admin: None,
        }
    }

    pub fn list() -> Self {
        Node {
            shape: Shape::List(Vec::new()),
            admin: None,
        }
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Node {
            shape: Shape::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            admin: None,
        }
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Node {
            shape: Shape::List(values.into_iter().collect()),
            admin: None,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_list(&self) -> bool {
        matches!(self.shape, Shape::List(_))
    }

    /// `"list"` for lists, `"object"` otherwise.
    pub fn structural_type(&self) -> &'static str {
        match self.shape {
            Shape::Object(_) => OBJECT_TYPE,
            Shape::List(_) => LIST_TYPE,
        }
    }

    /// The id assigned by a store, if any.
    pub fn id(&self) -> Option<&str> {
        self.admin.as_ref().map(|a| a.id.as_str())
    }

    /// The type assigned by a store, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.admin.as_ref().map(|a| a.type_name.as_str())
    }

    /// Names of the properties that held composite values at the last serialize.
    pub fn reference_properties(&self) -> Option<&IndexSet<String>> {
        self.admin.as_ref().map(|a| &a.reference_properties)
    }

    /// Reads a property. List elements are addressed by decimal index.
    /// Missing properties read as `Absent`.
    pub fn get(&self, name: &str) -> Value {
        match &self.shape {
            Shape::Object(props) => props.get(name).cloned().unwrap_or_default(),
            Shape::List(items) => parse_index(name)
                .and_then(|i| items.get(i).cloned())
                .unwrap_or_default(),
        }
    }

    pub fn at(&self, index: usize) -> Value {
        match &self.shape {
            Shape::Object(props) => props.get(&index.to_string()).cloned().unwrap_or_default(),
            Shape::List(items) => items.get(index).cloned().unwrap_or_default(),
        }
    }

    /// Writes a property, returning false if `name` is not an index of a list.
    ///
    /// Writing past the end of a list pads the gap with `Absent`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        let name = name.into();
        let value = value.into();
        match &mut self.shape {
            Shape::Object(props) => {
                props.insert(name, value);
                true
            }
            Shape::List(items) => match parse_index(&name) {
                Some(i) => {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Absent);
                    }
                    items[i] = value;
                    true
                }
                None => false,
            },
        }
    }

    /// Appends to a list. On an object, the value is keyed by the current length.
    pub fn push(&mut self, value: impl Into<Value>) {
        match &mut self.shape {
            Shape::Object(props) => {
                let key = props.len().to_string();
                props.insert(key, value.into());
            }
            Shape::List(items) => items.push(value.into()),
        }
    }

    /// Removes a property. Removing a list element shifts the following ones down.
    pub fn remove(&mut self, name: &str) -> Value {
        match &mut self.shape {
            Shape::Object(props) => props.shift_remove(name).unwrap_or_default(),
            Shape::List(items) => match parse_index(name) {
                Some(i) if i < items.len() => items.remove(i),
                _ => Value::Absent,
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.shape {
            Shape::Object(props) => props.len(),
            Shape::List(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own properties in enumeration order. List elements are keyed "0", "1", ...
    pub fn entries(&self) -> Vec<(String, Value)> {
        match &self.shape {
            Shape::Object(props) => props.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Shape::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect(),
        }
    }

    /// Calls the function stored under `name` with this node as receiver.
    ///
    /// Returns `None` when the node has no function property by that name.
    pub fn invoke(&self, name: &str) -> Option<Result<Value, HookError>> {
        match self.get(name) {
            Value::Function(f) => Some(f.call(self)),
            _ => None,
        }
    }

    /// Switches to the given shape unless it already matches.
    pub(crate) fn reshape(&mut self, list: bool) {
        if list != self.is_list() {
            self.shape = if list {
                Shape::List(Vec::new())
            } else {
                Shape::Object(IndexMap::new())
            };
        }
    }

    /// Drops data that a record is about to replace.
    ///
    /// Lists are emptied. Objects keep their functions and the named properties.
    pub(crate) fn clear_for_overwrite(&mut self, keep: &IndexSet<&str>) {
        match &mut self.shape {
            Shape::Object(props) => {
                props.retain(|k, v| matches!(v, Value::Function(_)) || keep.contains(k.as_str()))
            }
            Shape::List(items) => items.clear(),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::object()
    }
}

pub(crate) fn parse_index(name: &str) -> Option<usize> {
    // "01" and "+1" are property names, not indices
    if name.len() > 1 && name.starts_with('0') {
        return None;
    }
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// A shared handle to a composite value.
///
/// Identity is pointer identity: clones of one `ObjectRef` are the same object.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<Node>>);

impl ObjectRef {
    pub fn new(node: Node) -> Self {
        ObjectRef(Rc::new(RefCell::new(node)))
    }

    pub fn object() -> Self {
        Self::new(Node::object())
    }

    pub fn list() -> Self {
        Self::new(Node::list())
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::new(Node::from_entries(entries))
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(Node::from_values(values))
    }

    pub fn borrow(&self) -> Ref<'_, Node> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Node> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, name: &str) -> Value {
        self.borrow().get(name)
    }

    pub fn at(&self, index: usize) -> Value {
        self.borrow().at(index)
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> bool {
        self.borrow_mut().set(name, value)
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.borrow_mut().push(value)
    }

    pub fn remove(&self, name: &str) -> Value {
        self.borrow_mut().remove(name)
    }

    pub fn len(&self) -> usize {
        self.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.borrow().is_empty()
    }

    pub fn id(&self) -> Option<String> {
        self.borrow().id().map(str::to_string)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    // Never print the node itself: the graph may be cyclic.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(node) => match node.id() {
                Some(id) => write!(f, "ObjectRef(#{id})"),
                None => write!(f, "ObjectRef({:p})", Rc::as_ptr(&self.0)),
            },
            Err(_) => write!(f, "ObjectRef({:p})", Rc::as_ptr(&self.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_property_is_absent() {
        let node = Node::from_entries([("a", Value::from(1))]);
        assert_eq!(node.get("a"), Value::from(1));
        assert!(node.get("b").is_absent());
    }

    #[test]
    fn list_set_pads_with_absent() {
        let mut node = Node::list();
        assert!(node.set("2", 7));
        assert_eq!(node.len(), 3);
        assert!(node.at(0).is_absent());
        assert_eq!(node.at(2), Value::from(7));
        assert!(!node.set("x", 1));
        assert!(!node.set("01", 1));
    }

    #[test]
    fn list_remove_shifts() {
        let list = ObjectRef::from_values([1.into(), 2.into(), 3.into()]);
        assert_eq!(list.remove("1"), Value::from(2));
        assert_eq!(list.len(), 2);
        assert_eq!(list.at(1), Value::from(3));
    }

    #[test]
    fn object_identity_is_pointer_identity() {
        let a = ObjectRef::object();
        let b = ObjectRef::object();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn cyclic_debug_terminates() {
        let a = ObjectRef::object();
        a.set("self", a.clone());
        let text = format!("{:?}", a.borrow());
        assert!(text.contains("ObjectRef("));
    }

    #[test]
    fn invoke_passes_receiver() {
        let node = Node::from_entries([
            ("name", Value::from("n")),
            (
                "getName",
                Function::new(|this: &Node| Ok(this.get("name"))).into(),
            ),
        ]);
        assert_eq!(node.invoke("getName").unwrap().unwrap(), Value::from("n"));
        assert!(node.invoke("name").is_none());
    }

    #[test]
    fn non_finite_float_is_null() {
        assert!(Value::from(f64::NAN).is_null());
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn clear_for_overwrite_keeps_functions() {
        let mut node = Node::from_entries([
            ("a", Value::from(1)),
            ("b", Value::from(2)),
            ("f", Function::new(|_: &Node| Ok(Value::Null)).into()),
        ]);
        let keep: IndexSet<&str> = ["b"].into_iter().collect();
        node.clear_for_overwrite(&keep);
        assert!(node.get("a").is_absent());
        assert_eq!(node.get("b"), Value::from(2));
        assert!(matches!(node.get("f"), Value::Function(_)));
    }
}

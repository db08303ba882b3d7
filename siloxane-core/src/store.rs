use std::collections::HashSet;

use indexmap::IndexMap;

use crate::admin::Resolver;
use crate::config::StoreOptions;
use crate::error::{GraphError, GraphResult};
use crate::ids::IdSpace;
use crate::snapshot::Snapshot;
use crate::value::{ObjectRef, Value};

/// An in-memory store for graphs of objects, lists and scalars.
///
/// Responsibilities:
/// - Identity: every composite value gets a stable id and a type
/// - Serialization: the graph reachable from the roots becomes a flat [`Snapshot`]
/// - Deserialization: a snapshot becomes a live graph again, cycles included
/// - Garbage collection: objects not reached by a serialize pass are dropped
///
/// Roots are the entries whose id lies outside the generated-id namespace.
/// Everything else is kept alive only by being reachable from a root.
///
/// The store is single-threaded: values are `Rc` handles and hooks run inline.
pub struct GraphStore {
    options: StoreOptions,
    pub(crate) live: IndexMap<String, Value>,
    pub(crate) snapshot: Snapshot,
    /// Ids visited by the current serialize or deserialize pass.
    pub(crate) reachable: HashSet<String>,
    pub(crate) ids: IdSpace,
}

impl GraphStore {
    /// Creates an empty store with default options.
    pub fn new() -> Self {
        Self::with_options(StoreOptions::default())
    }

    pub fn with_options(options: StoreOptions) -> Self {
        let ids = IdSpace::new(options.config.generated_id_prefix.clone());
        let snapshot = Snapshot::new(options.config.admin_property.clone());
        GraphStore {
            options,
            live: IndexMap::new(),
            snapshot,
            reachable: HashSet::new(),
            ids,
        }
    }

    /// Creates a store and populates it from a snapshot.
    pub fn from_snapshot(options: StoreOptions, snapshot: Snapshot) -> GraphResult<Self> {
        let mut store = Self::with_options(options);
        store.deserialize(snapshot)?;
        Ok(store)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub(crate) fn resolver(&mut self) -> Resolver<'_> {
        Resolver {
            config: &self.options.config,
            ids: &mut self.ids,
        }
    }

    /// Stores a root value under `id`, replacing any previous root.
    ///
    /// An object that already carries an id keeps it and is stored under that
    /// id instead. Returns the id actually used. If that existing id is a
    /// generated one, the object is already owned by the graph and the call
    /// fails with [`GraphError::GeneratedRoot`].
    pub fn put(&mut self, id: &str, value: impl Into<Value>) -> GraphResult<String> {
        self.put_value(Some(id), value.into())
    }

    /// Stores an object as a root under the id derived from it (id getter or
    /// id property).
    pub fn put_object(&mut self, obj: &ObjectRef) -> GraphResult<String> {
        self.put_value(None, Value::Object(obj.clone()))
    }

    fn put_value(&mut self, id: Option<&str>, value: Value) -> GraphResult<String> {
        match value {
            Value::Function(_) => Err(GraphError::UnsupportedValueKind("function")),
            Value::Object(obj) => {
                let key = match obj.id() {
                    Some(existing) if self.ids.is_generated(&existing) => {
                        return Err(GraphError::GeneratedRoot(existing));
                    }
                    Some(existing) => existing,
                    None => {
                        let derived = {
                            let node = obj.borrow();
                            self.resolver().derive_id(&node, id)?
                        };
                        derived.ok_or_else(|| GraphError::MissingIdentifier(format!("{obj:?}")))?
                    }
                };
                self.check_root_id(&key)?;
                self.resolver().attach(&obj, Some(key.as_str()))?;
                log::trace!("put object {key}");
                self.live.insert(key.clone(), Value::Object(obj));
                Ok(key)
            }
            scalar => {
                let key = id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| GraphError::MissingIdentifier(format!("{scalar:?}")))?
                    .to_string();
                self.check_root_id(&key)?;
                self.live.insert(key.clone(), scalar);
                Ok(key)
            }
        }
    }

    fn check_root_id(&self, id: &str) -> GraphResult<()> {
        if self.ids.is_generated(id) {
            return Err(GraphError::ReservedIdentifier(id.to_string()));
        }
        Ok(())
    }

    /// Returns the live value for `id`, or `Absent`.
    pub fn get(&self, id: &str) -> Value {
        self.live.get(id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    /// Number of live entries, roots and reachable objects alike.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.live.keys().map(String::as_str)
    }

    /// The snapshot produced by the last serialize, or consumed by the last
    /// deserialize.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Highest generated id suffix handed out or observed so far.
    pub fn generated_id_counter(&self) -> u64 {
        self.ids.counter()
    }

    /// Parses a JSON snapshot using the configured admin property and
    /// deserializes it.
    pub fn deserialize_json(&mut self, json: &serde_json::Value) -> GraphResult<()> {
        let snapshot = Snapshot::from_json(json, &self.options.config.admin_property)?;
        self.deserialize(snapshot)
    }

    /// Serializes, resets the store and deserializes the result again.
    ///
    /// The snapshot goes through its JSON form, so the rebuilt graph holds
    /// exactly what a caller persisting the snapshot would get back. Options
    /// are kept. Handles obtained before the reload point into the old graph.
    ///
    /// The graph is rebuilt in a fresh store that replaces this one only on
    /// success, so a failed reload leaves the serialized store in place.
    pub fn reload(&mut self) -> GraphResult<()> {
        let json = self.serialize()?.to_json();
        let snapshot = Snapshot::from_json(&json, &self.options.config.admin_property)?;
        let mut fresh = Self::with_options(self.options.clone());
        fresh.deserialize(snapshot)?;
        *self = fresh;
        log::debug!("reloaded {} live entries", self.live.len());
        Ok(())
    }

    /// Number of records per declared type in the current snapshot.
    pub fn statistics(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for record in self.snapshot.records() {
            *counts.entry(record.type_name().to_string()).or_insert(0) += 1;
        }
        for (type_name, count) in &counts {
            log::debug!("{type_name}: {count}");
        }
        counts
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("live", &self.live.len())
            .field("snapshot", &self.snapshot.len())
            .field("generated_id_counter", &self.ids.counter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Function;

    #[test]
    fn put_and_get_scalar() {
        let mut store = GraphStore::new();
        assert_eq!(store.put("a", 1).unwrap(), "a");
        assert_eq!(store.get("a"), Value::from(1));
        assert!(store.get("b").is_absent());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn put_object_keeps_identity() {
        let mut store = GraphStore::new();
        let obj = ObjectRef::from_entries([("x", Value::from(1))]);
        store.put("a", obj.clone()).unwrap();
        assert_eq!(store.get("a").as_object(), Some(&obj));
        assert_eq!(obj.id().as_deref(), Some("a"));
    }

    #[test]
    fn object_keeps_first_id() {
        let mut store = GraphStore::new();
        let obj = ObjectRef::object();
        store.put("a", obj.clone()).unwrap();
        assert_eq!(store.put("b", obj.clone()).unwrap(), "a");
        assert!(!store.contains("b"));
    }

    #[test]
    fn scalar_without_id_is_rejected() {
        let mut store = GraphStore::new();
        let err = store.put("", 1).unwrap_err();
        assert!(matches!(err, GraphError::MissingIdentifier(_)));
    }

    #[test]
    fn object_without_derivable_id_is_rejected() {
        let mut store = GraphStore::new();
        let err = store.put_object(&ObjectRef::object()).unwrap_err();
        assert!(matches!(err, GraphError::MissingIdentifier(_)));
        assert_eq!(store.generated_id_counter(), 0);
    }

    #[test]
    fn function_is_unsupported() {
        let mut store = GraphStore::new();
        let f = Function::new(|_: &crate::Node| Ok(Value::Null));
        let err = store.put("f", f).unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedValueKind("function")));
    }

    #[test]
    fn generated_namespace_is_reserved() {
        let mut store = GraphStore::new();
        let err = store.put("__1", 1).unwrap_err();
        assert!(matches!(err, GraphError::ReservedIdentifier(_)));
    }

    #[test]
    fn object_with_generated_id_cannot_become_root() {
        let mut store = GraphStore::new();
        let child = ObjectRef::object();
        store
            .put("a", ObjectRef::from_entries([("child", child.clone().into())]))
            .unwrap();
        store.serialize().unwrap();

        let err = store.put("fav", child.clone()).unwrap_err();
        assert!(matches!(err, GraphError::GeneratedRoot(ref id) if id == "__1"));
        assert!(err.to_string().contains("__1"));
        assert!(!store.contains("fav"));
        assert_eq!(child.id().as_deref(), Some("__1"));
    }

    #[test]
    fn statistics_count_types() {
        let mut store = GraphStore::new();
        let list = ObjectRef::from_values([
            ObjectRef::object().into(),
            ObjectRef::object().into(),
        ]);
        store.put("a", list).unwrap();
        store.serialize().unwrap();
        let stats = store.statistics();
        assert_eq!(stats.get("list"), Some(&1));
        assert_eq!(stats.get("object"), Some(&2));
    }
}

use indexmap::{IndexMap, IndexSet};

use crate::error::{GraphError, GraphResult};
use crate::snapshot::{Entry, Record, Snapshot};
use crate::store::GraphStore;
use crate::value::{LIST_TYPE, Node, OBJECT_TYPE, ObjectRef, Value, parse_index};

/// Absent slots a list record may leave between its written elements.
const MAX_LIST_GAP: usize = 1024;

/// The instance a record will be written into.
struct Slot {
    obj: ObjectRef,
    /// Already live under the record's id, so it is overwritten in place.
    reused: bool,
    /// Shape after the overwrite.
    list: bool,
}

impl GraphStore {
    /// Rebuilds the live graph from a snapshot.
    ///
    /// Objects already live under a snapshot id are updated in place, so
    /// handles held by the caller stay valid. Other live entries are left
    /// untouched. The snapshot is retained as the store's current snapshot.
    ///
    /// Every reference, list index and type is checked before the first live
    /// object is touched: on error the store is unchanged.
    pub fn deserialize(&mut self, snapshot: Snapshot) -> GraphResult<()> {
        check_references(&snapshot)?;
        let slots = self.allocate_all(&snapshot)?;
        for (id, slot) in &slots {
            if slot.list {
                if let Some(record) = snapshot.record(id) {
                    check_list_keys(record)?;
                }
            }
        }

        self.reachable.clear();
        for (id, entry) in snapshot.iter() {
            match entry {
                Entry::Scalar(scalar) => {
                    self.live.insert(id.to_string(), Value::from(scalar.clone()));
                }
                Entry::Record(record) => self.fill(record, &slots),
            }
            self.reachable.insert(id.to_string());
        }
        log::debug!(
            "deserialized {} entries, generated id counter at {}",
            snapshot.len(),
            self.ids.counter()
        );
        self.snapshot = snapshot;
        Ok(())
    }

    /// Finds or creates the instance of every record.
    ///
    /// Nothing live is modified here. All instances exist before any field is
    /// written, so references in cycles resolve to the same instance.
    fn allocate_all(&self, snapshot: &Snapshot) -> GraphResult<IndexMap<String, Slot>> {
        let mut slots = IndexMap::new();
        for record in snapshot.records() {
            let slot = match self.live.get(record.id()) {
                Some(Value::Object(existing)) => {
                    let list = match record.type_name() {
                        OBJECT_TYPE => false,
                        LIST_TYPE => true,
                        _ => existing.borrow().is_list(),
                    };
                    Slot {
                        obj: existing.clone(),
                        reused: true,
                        list,
                    }
                }
                _ => {
                    let node = self.blank(record.type_name())?;
                    Slot {
                        list: node.is_list(),
                        obj: ObjectRef::new(node),
                        reused: false,
                    }
                }
            };
            slots.insert(record.id().to_string(), slot);
        }
        Ok(slots)
    }

    /// Writes one record into its instance and registers it as live.
    fn fill(&mut self, record: &Record, slots: &IndexMap<String, Slot>) {
        let id = record.id();
        let Some(slot) = slots.get(id) else {
            return;
        };
        self.ids.observe(id);
        let mut node = slot.obj.borrow_mut();
        if slot.reused {
            let keep: IndexSet<&str> = record.fields.keys().map(String::as_str).collect();
            match record.type_name() {
                OBJECT_TYPE => node.reshape(false),
                LIST_TYPE => node.reshape(true),
                _ => {}
            }
            node.clear_for_overwrite(&keep);
        }
        node.admin = Some(record.admin.clone());
        for (name, scalar) in &record.fields {
            let value = match record.reference(name).and_then(|target| slots.get(target)) {
                Some(target) => Value::Object(target.obj.clone()),
                None => Value::from(scalar.clone()),
            };
            // list keys were checked against the slot's shape
            node.set(name.as_str(), value);
        }
        drop(node);
        self.live.insert(id.to_string(), Value::Object(slot.obj.clone()));
    }

    /// A blank instance of a declared type: structural types directly, other
    /// types through the construction hook or else the type registry.
    fn blank(&self, type_name: &str) -> GraphResult<Node> {
        match type_name {
            OBJECT_TYPE => Ok(Node::object()),
            LIST_TYPE => Ok(Node::list()),
            other => {
                if let Some(create) = self.options().hooks.create_object() {
                    return create(other).map_err(GraphError::Hook);
                }
                self.options()
                    .registry
                    .blank(other)
                    .ok_or_else(|| GraphError::UnknownType(other.to_string()))
            }
        }
    }
}

/// Every reference property must hold a token naming another record.
fn check_references(snapshot: &Snapshot) -> GraphResult<()> {
    for record in snapshot.records() {
        let id = record.id();
        for name in record.fields.keys() {
            if !record.is_reference(name) {
                continue;
            }
            let target = record.reference(name).ok_or_else(|| {
                GraphError::MalformedSnapshot(format!("{id}.{name} is not a reference token"))
            })?;
            match snapshot.get(target) {
                None => {
                    return Err(GraphError::UnresolvableReference {
                        owner: id.to_string(),
                        property: name.clone(),
                        target: target.to_string(),
                    });
                }
                Some(Entry::Scalar(_)) => {
                    return Err(GraphError::MalformedSnapshot(format!(
                        "{target} is referenced but is not an object"
                    )));
                }
                Some(Entry::Record(_)) => {}
            }
        }
    }
    Ok(())
}

/// List records hold decimal indices only, with bounded gaps between them.
fn check_list_keys(record: &Record) -> GraphResult<()> {
    let id = record.id();
    let mut len = 0;
    for name in record.fields.keys() {
        let index = parse_index(name).ok_or_else(|| {
            GraphError::MalformedSnapshot(format!("{id}.{name} is not a list index"))
        })?;
        len = len.max(index.saturating_add(1));
    }
    if len - record.fields.len() > MAX_LIST_GAP {
        return Err(GraphError::MalformedSnapshot(format!(
            "list {id} has length {len} but only {} elements",
            record.fields.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::GraphError;
    use crate::store::GraphStore;
    use crate::value::{ObjectRef, Value};

    #[test]
    fn back_reference_resolves_to_same_instance() {
        let mut store = GraphStore::new();
        store
            .deserialize_json(&json!({
                "a": {"__odb": {"id": "a", "type": "object", "referenceProperties": {"b": true}}, "b": "#__1"},
                "__1": {"__odb": {"id": "__1", "type": "object", "referenceProperties": {"a": true}}, "a": "#a"}
            }))
            .unwrap();

        let a = store.get("a");
        let a = a.as_object().unwrap();
        let b = a.get("b");
        assert_eq!(b.as_object().unwrap().get("a").as_object(), Some(a));
        assert_eq!(store.generated_id_counter(), 1);
    }

    #[test]
    fn missing_target_is_unresolvable() {
        let mut store = GraphStore::new();
        let err = store
            .deserialize_json(&json!({
                "a": {"__odb": {"id": "a", "type": "object", "referenceProperties": {"b": true}}, "b": "#nowhere"}
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnresolvableReference { ref target, .. } if target == "nowhere"
        ));
    }

    #[test]
    fn reference_to_scalar_is_malformed() {
        let mut store = GraphStore::new();
        let err = store
            .deserialize_json(&json!({
                "n": 1,
                "a": {"__odb": {"id": "a", "type": "object", "referenceProperties": {"b": true}}, "b": "#n"}
            }))
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedSnapshot(_)));
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut store = GraphStore::new();
        let err = store
            .deserialize_json(&json!({"a": {"__odb": {"id": "a", "type": "Widget"}}}))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownType(ref t) if t == "Widget"));
    }

    #[test]
    fn list_fields_are_indices() {
        let mut store = GraphStore::new();
        store
            .deserialize_json(&json!({
                "l": {"__odb": {"id": "l", "type": "list"}, "0": 1, "2": 3}
            }))
            .unwrap();
        let list = store.get("l");
        let list = list.as_object().unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.at(1).is_absent());

        let err = store
            .deserialize_json(&json!({"m": {"__odb": {"id": "m", "type": "list"}, "x": 1}}))
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedSnapshot(_)));
    }

    #[test]
    fn oversized_list_index_is_malformed() {
        let mut store = GraphStore::new();
        let err = store
            .deserialize_json(&json!({
                "l": {"__odb": {"id": "l", "type": "list"}, "99999999999999999": 1}
            }))
            .unwrap_err();
        assert!(matches!(err, GraphError::MalformedSnapshot(_)));
        assert!(store.is_empty());

        // a gap within the bound is padded with absent slots
        store
            .deserialize_json(&json!({
                "l": {"__odb": {"id": "l", "type": "list"}, "0": 1, "1000": 2}
            }))
            .unwrap();
        assert_eq!(store.get("l").as_object().unwrap().len(), 1001);
    }

    #[test]
    fn failed_deserialize_leaves_live_objects_untouched() {
        let mut store = GraphStore::new();
        let a = ObjectRef::from_entries([("x", Value::from(1)), ("stale", Value::from(true))]);
        store.put("a", a.clone()).unwrap();

        let err = store
            .deserialize_json(&json!({
                "a": {"__odb": {"id": "a", "type": "object", "referenceProperties": {"b": true}},
                      "x": 99, "b": "#missing"}
            }))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnresolvableReference { .. }));
        assert_eq!(a.get("x"), Value::from(1));
        assert_eq!(a.get("stale"), Value::from(true));

        let err = store
            .deserialize_json(&json!({
                "a": {"__odb": {"id": "a", "type": "object"}, "x": 99},
                "w": {"__odb": {"id": "w", "type": "Widget"}}
            }))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownType(_)));
        assert_eq!(a.get("x"), Value::from(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn existing_object_is_overwritten_in_place() {
        let mut store = GraphStore::new();
        let a = ObjectRef::from_entries([("x", Value::from(1)), ("stale", Value::from(true))]);
        store.put("a", a.clone()).unwrap();
        store
            .deserialize_json(&json!({"a": {"__odb": {"id": "a", "type": "object"}, "x": 2}}))
            .unwrap();

        assert_eq!(store.get("a").as_object(), Some(&a));
        assert_eq!(a.get("x"), Value::from(2));
        assert!(a.get("stale").is_absent());
    }
}

use crate::error::{GraphError, GraphResult};
use crate::snapshot::{Entry, Record, Snapshot, reference_token};
use crate::store::GraphStore;
use crate::value::{ObjectRef, Scalar, Value};

impl GraphStore {
    /// Serializes everything reachable from the roots, then collects the rest.
    ///
    /// Each call walks the whole graph again and rebuilds the snapshot from
    /// scratch. Objects seen for the first time get their admin data here.
    pub fn serialize(&mut self) -> GraphResult<Snapshot> {
        self.snapshot = Snapshot::new(self.options().config.admin_property.clone());
        self.reachable.clear();

        let roots: Vec<(String, Value)> = self
            .live
            .iter()
            .filter(|(id, _)| !self.ids.is_generated(id))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect();

        for (id, value) in roots {
            match value {
                Value::Object(obj) => {
                    self.serialize_object(&obj)?;
                }
                Value::Function(_) => return Err(GraphError::UnsupportedValueKind("function")),
                scalar => {
                    // absent roots stay live but are not written
                    if let Some(scalar) = scalar.to_scalar() {
                        self.snapshot.insert(id.clone(), Entry::Scalar(scalar));
                    }
                    self.reachable.insert(id);
                }
            }
        }

        let collected = self.collect_garbage();
        log::debug!(
            "serialized {} entries, collected {} unreachable",
            self.snapshot.len(),
            collected
        );
        Ok(self.snapshot.clone())
    }

    /// Writes the record of `obj` and of everything it references.
    ///
    /// The id is marked reachable before the properties are visited, so a
    /// cycle leading back here stops at the check below.
    fn serialize_object(&mut self, obj: &ObjectRef) -> GraphResult<String> {
        let admin = self.resolver().attach(obj, None)?;
        let id = admin.id.clone();
        if !self.reachable.insert(id.clone()) {
            return Ok(id);
        }
        log::trace!("serializing {id} ({})", admin.type_name);
        self.live.insert(id.clone(), Value::Object(obj.clone()));

        // Reserve the slot so an owner precedes what it references.
        let mut record = Record::new(admin);
        record.admin.reference_properties.clear();
        self.snapshot.insert(id.clone(), Entry::Record(record.clone()));

        let check_insertion = self.options().hooks.check_insertion().cloned();
        let admin_property = self.options().config.admin_property.clone();
        let entries = obj.borrow().entries();
        for (name, value) in entries {
            // the admin property key belongs to the record's metadata
            if name == admin_property {
                log::trace!("skipping {id}.{name}, it shadows the admin property");
                continue;
            }
            if let Some(check) = &check_insertion {
                if !check(obj, &name, &value).map_err(GraphError::Hook)? {
                    log::trace!("insertion check excluded {id}.{name}");
                    continue;
                }
            }
            match value {
                Value::Absent => {}
                Value::Function(_) => log::trace!("skipping function property {id}.{name}"),
                Value::Object(child) => {
                    let child_id = self.serialize_object(&child)?;
                    record
                        .fields
                        .insert(name.clone(), Scalar::String(reference_token(&child_id)));
                    record.admin.reference_properties.insert(name);
                }
                scalar => {
                    if let Some(scalar) = scalar.to_scalar() {
                        record.fields.insert(name, scalar);
                    }
                }
            }
        }

        if let Some(admin) = obj.borrow_mut().admin.as_mut() {
            admin.reference_properties = record.admin.reference_properties.clone();
        }
        self.snapshot.insert(id.clone(), Entry::Record(record));
        Ok(id)
    }
}

use indexmap::{IndexMap, IndexSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value as Json};

use crate::admin::AdminData;
use crate::config::DEFAULT_ADMIN_PROPERTY;
use crate::error::{GraphError, GraphResult};
use crate::fingerprint::Fingerprint;
use crate::value::Scalar;

/// Prefix of reference tokens.
pub const REFERENCE_MARKER: char = '#';

/// Builds the reference token for an id.
pub fn reference_token(id: &str) -> String {
    format!("{REFERENCE_MARKER}{id}")
}

/// The serialized form of one composite value.
///
/// Reference properties hold a reference token (`"#" + id`) instead of the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub admin: AdminData,
    pub fields: IndexMap<String, Scalar>,
}

impl Record {
    pub fn new(admin: AdminData) -> Self {
        Record {
            admin,
            fields: IndexMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.admin.id
    }

    pub fn type_name(&self) -> &str {
        &self.admin.type_name
    }

    pub fn is_reference(&self, name: &str) -> bool {
        self.admin.reference_properties.contains(name)
    }

    /// Target id of a reference property.
    pub fn reference(&self, name: &str) -> Option<&str> {
        if !self.is_reference(name) {
            return None;
        }
        self.fields
            .get(name)
            .and_then(Scalar::as_str)
            .and_then(|token| token.strip_prefix(REFERENCE_MARKER))
    }
}

/// One entry of a snapshot: a root scalar or a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Scalar(Scalar),
    Record(Record),
}

/// The flat, id-keyed representation of an object graph.
///
/// Entries keep the order in which they were produced. The admin property
/// name decides the key under which each record's metadata is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    admin_property: String,
    entries: IndexMap<String, Entry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_PROPERTY)
    }
}

impl Snapshot {
    pub fn new(admin_property: impl Into<String>) -> Self {
        Snapshot {
            admin_property: admin_property.into(),
            entries: IndexMap::new(),
        }
    }

    pub fn admin_property(&self) -> &str {
        &self.admin_property
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: Entry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    pub fn record(&self, id: &str) -> Option<&Record> {
        match self.entries.get(id) {
            Some(Entry::Record(record)) => Some(record),
            _ => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(id, entry)| (id.as_str(), entry))
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Record(record) => Some(record),
            Entry::Scalar(_) => None,
        })
    }

    pub fn to_json(&self) -> Json {
        let mut out = Map::new();
        for (id, entry) in &self.entries {
            let value = match entry {
                Entry::Scalar(scalar) => scalar.to_json(),
                Entry::Record(record) => Json::Object(self.record_to_json(record)),
            };
            out.insert(id.clone(), value);
        }
        Json::Object(out)
    }

    fn record_to_json(&self, record: &Record) -> Map<String, Json> {
        let mut out = Map::new();
        out.insert(self.admin_property.clone(), admin_to_json(&record.admin));
        for (name, scalar) in &record.fields {
            out.insert(name.clone(), scalar.to_json());
        }
        out
    }

    /// Parses the JSON form, reading record metadata from `admin_property`.
    pub fn from_json(json: &Json, admin_property: &str) -> GraphResult<Self> {
        let Json::Object(map) = json else {
            return Err(malformed("snapshot is not an object"));
        };
        let mut snapshot = Snapshot::new(admin_property);
        for (id, value) in map {
            let entry = match value {
                Json::Object(fields) => Entry::Record(record_from_json(id, fields, admin_property)?),
                other => Entry::Scalar(
                    Scalar::from_json(other)
                        .ok_or_else(|| malformed(format!("entry {id} is not a scalar")))?,
                ),
            };
            snapshot.entries.insert(id.clone(), entry);
        }
        Ok(snapshot)
    }

    pub fn to_json_string(&self) -> GraphResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(text: &str, admin_property: &str) -> GraphResult<Self> {
        let json: Json = serde_json::from_str(text)?;
        Self::from_json(&json, admin_property)
    }

    pub fn to_cbor(&self) -> GraphResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| GraphError::Cbor(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_cbor(bytes: &[u8], admin_property: &str) -> GraphResult<Self> {
        let json: Json = ciborium::from_reader(bytes).map_err(|e| GraphError::Cbor(e.to_string()))?;
        Self::from_json(&json, admin_property)
    }

    /// Blake3 digest of the CBOR encoding.
    pub fn fingerprint(&self) -> GraphResult<Fingerprint> {
        Ok(Fingerprint::from_data(&self.to_cbor()?))
    }
}

fn malformed(reason: impl Into<String>) -> GraphError {
    GraphError::MalformedSnapshot(reason.into())
}

fn admin_to_json(admin: &AdminData) -> Json {
    let references: Map<String, Json> = admin
        .reference_properties
        .iter()
        .map(|name| (name.clone(), Json::Bool(true)))
        .collect();
    let mut out = Map::new();
    out.insert("id".to_string(), Json::String(admin.id.clone()));
    out.insert("type".to_string(), Json::String(admin.type_name.clone()));
    out.insert("referenceProperties".to_string(), Json::Object(references));
    Json::Object(out)
}

fn record_from_json(id: &str, fields: &Map<String, Json>, admin_property: &str) -> GraphResult<Record> {
    let admin = fields
        .get(admin_property)
        .ok_or_else(|| malformed(format!("record {id} has no {admin_property}")))?;
    let admin = admin_from_json(id, admin)?;
    if admin.id != id {
        return Err(malformed(format!("record {id} claims id {}", admin.id)));
    }
    let mut record = Record::new(admin);
    for (name, value) in fields {
        if name == admin_property {
            continue;
        }
        let scalar = Scalar::from_json(value)
            .ok_or_else(|| malformed(format!("field {id}.{name} is not a scalar")))?;
        record.fields.insert(name.clone(), scalar);
    }
    Ok(record)
}

fn admin_from_json(id: &str, json: &Json) -> GraphResult<AdminData> {
    let text = |key: &str| {
        json.get(key)
            .and_then(Json::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed(format!("admin data of {id} has no {key}")))
    };
    let mut admin = AdminData::new(text("id")?, text("type")?);
    admin.reference_properties = match json.get("referenceProperties") {
        None | Some(Json::Null) => IndexSet::new(),
        Some(Json::Object(flags)) => flags
            .iter()
            .filter(|(_, flag)| flag.as_bool() == Some(true))
            .map(|(name, _)| name.clone())
            .collect(),
        Some(Json::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed(format!("reference property of {id} is not a name")))
            })
            .collect::<GraphResult<_>>()?,
        Some(_) => return Err(malformed(format!("reference properties of {id} are malformed"))),
    };
    Ok(admin)
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, entry) in &self.entries {
            match entry {
                Entry::Scalar(scalar) => map.serialize_entry(id, scalar)?,
                Entry::Record(record) => map.serialize_entry(
                    id,
                    &RecordView {
                        record,
                        admin_property: &self.admin_property,
                    },
                )?,
            }
        }
        map.end()
    }
}

struct RecordView<'a> {
    record: &'a Record,
    admin_property: &'a str,
}

impl Serialize for RecordView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.record.fields.len() + 1))?;
        map.serialize_entry(self.admin_property, &AdminView(&self.record.admin))?;
        for (name, scalar) in &self.record.fields {
            map.serialize_entry(name, scalar)?;
        }
        map.end()
    }
}

struct AdminView<'a>(&'a AdminData);

impl Serialize for AdminView<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let references: IndexMap<&str, bool> = self
            .0
            .reference_properties
            .iter()
            .map(|name| (name.as_str(), true))
            .collect();
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.0.id)?;
        map.serialize_entry("type", &self.0.type_name)?;
        map.serialize_entry("referenceProperties", &references)?;
        map.end()
    }
}

//! Siloxane is an in-memory store for cyclic object graphs.
//!
//! Core concepts:
//! - **Value**: a scalar, a shared composite (`ObjectRef`) or a function
//! - **Admin data**: the id and type the store attaches to every composite
//! - **Snapshot**: the flat, id-keyed form of a graph, with nested composites
//!   replaced by `"#" + id` reference tokens
//! - **GraphStore**: holds the live graph and converts it to and from snapshots
//!
//! # Example
//!
//! ```
//! use siloxane_core::{GraphStore, ObjectRef, Value};
//!
//! let mut store = GraphStore::new();
//!
//! // a <-> b
//! let a = ObjectRef::object();
//! let b = ObjectRef::from_entries([("peer", Value::from(a.clone()))]);
//! a.set("peer", b);
//! store.put("a", a).unwrap();
//!
//! let json = store.serialize().unwrap().to_json();
//!
//! let mut restored = GraphStore::new();
//! restored.deserialize_json(&json).unwrap();
//! let a = restored.get("a");
//! let a = a.as_object().unwrap();
//! assert_eq!(a.get("peer").as_object().unwrap().get("peer").as_object(), Some(a));
//! ```
//!
//! Values are `Rc` handles: a store and its graph belong to one thread.
//! Cycles between `ObjectRef`s are reference cycles and are not freed until
//! the caller breaks them.

mod admin;
mod config;
mod deserialize;
mod error;
mod fingerprint;
mod gc;
mod hooks;
mod ids;
mod serialize;
mod snapshot;
mod store;
mod value;

pub use admin::AdminData;
pub use config::{
    DEFAULT_ADMIN_PROPERTY, DEFAULT_GENERATED_ID_PREFIX, DEFAULT_TYPE_PROPERTY, StoreConfig,
    StoreOptions,
};
pub use error::{GraphError, GraphResult, HookError};
pub use fingerprint::Fingerprint;
pub use hooks::{CheckInsertion, CreateObject, Hooks, TypeRegistry};
pub use snapshot::{Entry, REFERENCE_MARKER, Record, Snapshot, reference_token};
pub use store::GraphStore;
pub use value::{Function, LIST_TYPE, Node, OBJECT_TYPE, ObjectRef, Scalar, Shape, Value};

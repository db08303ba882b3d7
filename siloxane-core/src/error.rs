/// Error returned by a user-supplied hook or capability.
///
/// Hook failures are carried through [`GraphError::Hook`] unchanged.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for graph store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A root value was inserted without an id and none could be derived.
    #[error("no id for top-level value {0}")]
    MissingIdentifier(String),
    /// A root id falls inside the generated-id namespace.
    #[error("id {0} is reserved for generated ids")]
    ReservedIdentifier(String),
    /// An object that already carries a generated id was offered as a root.
    /// Ids are immutable, so the object cannot be stored under another one.
    #[error("object already carries generated id {0} and cannot become a root")]
    GeneratedRoot(String),
    /// The value cannot be stored (e.g. a function).
    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(&'static str),
    /// A reference token points at an id missing from the snapshot.
    #[error("unresolvable reference #{target} in {owner}.{property}")]
    UnresolvableReference {
        owner: String,
        property: String,
        target: String,
    },
    /// No construction hook and no registry entry for a declared type.
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("hook failed: {0}")]
    Hook(#[source] HookError),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cbor error: {0}")]
    Cbor(String),
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result alias for graph store operations.
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_reference_message() {
        let err = GraphError::UnresolvableReference {
            owner: "a".to_string(),
            property: "next".to_string(),
            target: "b".to_string(),
        };
        assert_eq!(err.to_string(), "unresolvable reference #b in a.next");
    }

    #[test]
    fn hook_error_keeps_source() {
        let err = GraphError::Hook("boom".into());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "boom");
    }
}

use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable document identifier derived from the path relative to the
/// source root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    /// Key used in the tantivy index and embedding database.
    pub numeric: u64,
    /// Short hex string for display (e.g. "a1b2c3").
    pub short: String,
}

impl DocumentId {
    pub fn new(relative_path: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        relative_path.hash(&mut hasher);
        Self::from_numeric(hasher.finish())
    }

    /// Rebuild an ID from a stored numeric key.
    pub fn from_numeric(numeric: u64) -> Self {
        Self {
            numeric,
            short: format!("{numeric:016x}")[..6].to_string(),
        }
    }

    /// Full 16-digit hex form, used as the index key.
    pub fn hex(&self) -> String {
        format!("{:016x}", self.numeric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(DocumentId::new("hello.md"), DocumentId::new("hello.md"));
    }

    #[test]
    fn different_paths_differ() {
        let a = DocumentId::new("notes/hello.md");
        let b = DocumentId::new("notes/world.md");
        assert_ne!(a.numeric, b.numeric);
    }

    #[test]
    fn from_numeric_roundtrips() {
        let id = DocumentId::new("hello.md");
        assert_eq!(DocumentId::from_numeric(id.numeric), id);
    }

    #[test]
    fn short_is_prefix_of_hex() {
        let id = DocumentId::new("hello.md");
        assert_eq!(id.hex().len(), 16);
        assert!(id.hex().starts_with(&id.short));
    }
}

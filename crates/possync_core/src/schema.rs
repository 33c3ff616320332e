//! Collection schema.

use crate::document::DocumentKind;
use crate::reference::ReferenceKind;
use crate::types::Keying;

/// Schema version of [`Schema::point_of_sale`].
pub const POINT_OF_SALE_SCHEMA_VERSION: u32 = 1;

/// Declaration of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    name: String,
    keying: Keying,
}

impl CollectionDef {
    /// An auto-keyed collection (store-assigned integer ids).
    pub fn auto(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keying: Keying::AutoIncrement,
        }
    }

    /// A caller-keyed collection.
    pub fn caller(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keying: Keying::Caller,
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Keying mode.
    #[must_use]
    pub fn keying(&self) -> Keying {
        self.keying
    }
}

/// A versioned set of collections.
///
/// Schemas only grow: a later version may add collections but never drops
/// or re-keys an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    version: u32,
    collections: Vec<CollectionDef>,
}

impl Schema {
    /// Creates an empty schema at `version`.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            version,
            collections: Vec::new(),
        }
    }

    /// Adds a collection.
    #[must_use]
    pub fn with(mut self, def: CollectionDef) -> Self {
        self.collections.retain(|c| c.name != def.name);
        self.collections.push(def);
        self
    }

    /// Changes the version.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Declared collections.
    #[must_use]
    pub fn collections(&self) -> &[CollectionDef] {
        &self.collections
    }

    /// The point-of-sale schema: one auto-keyed queue per document kind and
    /// one caller-keyed cache per reference kind.
    #[must_use]
    pub fn point_of_sale() -> Self {
        let mut schema = Self::new(POINT_OF_SALE_SCHEMA_VERSION);
        for kind in DocumentKind::ALL {
            schema = schema.with(CollectionDef::auto(kind.collection()));
        }
        for kind in ReferenceKind::ALL {
            schema = schema.with(CollectionDef::caller(kind.collection()));
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_of_sale_has_queues_and_caches() {
        let schema = Schema::point_of_sale();
        assert_eq!(schema.version(), POINT_OF_SALE_SCHEMA_VERSION);
        assert_eq!(schema.collections().len(), 8);

        let invoices = schema
            .collections()
            .iter()
            .find(|c| c.name() == "pending_invoices")
            .unwrap();
        assert_eq!(invoices.keying(), Keying::AutoIncrement);

        let catalog = schema
            .collections()
            .iter()
            .find(|c| c.name() == "catalog_cache")
            .unwrap();
        assert_eq!(catalog.keying(), Keying::Caller);
    }

    #[test]
    fn redeclaring_a_collection_replaces_it() {
        let schema = Schema::new(1)
            .with(CollectionDef::auto("a"))
            .with(CollectionDef::caller("a"));
        assert_eq!(schema.collections().len(), 1);
        assert_eq!(schema.collections()[0].keying(), Keying::Caller);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one entity slot: `(type, name, version)`.
///
/// Two keys that differ only in version address different slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    entity_type: String,
    name: String,
    version: u64,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, name: impl Into<String>, version: u64) -> Self {
        Self {
            entity_type: entity_type.into(),
            name: name.into(),
            version,
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@v{}", self.entity_type, self.name, self.version)
    }
}

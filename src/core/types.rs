use super::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Opaque configuration bytes handed to an entity service at creation.
///
/// The registry never looks inside. Entity types that want structured
/// configuration use [`ConfigBlob::encode`] / [`ConfigBlob::decode`]
/// (MessagePack).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigBlob(Vec<u8>);

impl ConfigBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self(rmp_serde::to_vec(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(rmp_serde::from_slice(&self.0)?)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for ConfigBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

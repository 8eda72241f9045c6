use std::time::Duration;
use thiserror::Error;

use super::EntityKey;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("Entity '{0}' not found")]
    NotFound(EntityKey),

    #[error("Entity '{0}' already exists")]
    AlreadyExists(EntityKey),

    #[error("Entity type '{entity_type}' supports version {expected}, requested {requested}")]
    VersionMismatch {
        entity_type: String,
        expected: u64,
        requested: u64,
    },

    #[error("Entity '{key}' is busy: {open_handles} open handle(s)")]
    Busy { key: EntityKey, open_handles: usize },

    #[error("Entity '{0}' was destroyed")]
    Destroyed(EntityKey),

    #[error("No service provides entity type '{0}'")]
    NotProvided(String),

    #[error("A service for entity type '{0}' is already registered")]
    ServiceExists(String),

    #[error("Invalid entity configuration: {0}")]
    InvalidConfig(String),

    #[error("Timed out after {timeout:?} waiting for '{key}' to release its handles")]
    Timeout { key: EntityKey, timeout: Duration },

    #[error("Connection {0} is closed")]
    ConnectionClosed(String),

    #[error("Handle on '{0}' is already closed")]
    HandleClosed(EntityKey),

    #[error("Entity '{0}' does not match the requested client type")]
    TypeMismatch(EntityKey),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Entity registry is shut down")]
    ShutDown,

    #[error("Registry configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EntityError>;

impl<T> From<std::sync::PoisonError<T>> for EntityError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for EntityError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for EntityError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for EntityError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

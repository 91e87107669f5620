//! Defines error types.

use std::io;

use crate::machine;
use crate::EntityId;

pub type Result<T> = core::result::Result<T, Error>;

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error")]
    IoError(#[from] io::Error),

    #[error("json deserialization error: {0}")]
    JsonDeserError(#[from] serde_json::Error),

    #[error("unsupported ir version: {0}")]
    UnsupportedIrVersion(String),

    #[error("malformed ir: {0}")]
    MalformedIr(String),

    #[error("unknown field type \"{type_name}\" on {component}.{field}")]
    UnknownFieldType {
        component: String,
        field: String,
        type_name: String,
    },

    #[error("duplicate entity id: {0}")]
    DuplicateEntityId(EntityId),

    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),

    #[error("other error: {0}")]
    Other(String),

    #[error("runtime machine error")]
    Machine(#[from] machine::Error),
}

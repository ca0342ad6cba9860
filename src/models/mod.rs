//! Derived view entities returned by the portal service.
//!
//! Files and directories have no independent existence in the blob store;
//! both are recomputed per request from the flat key set and serialize
//! naturally as JSON via `serde`.

pub mod directory_item;
pub mod file_item;

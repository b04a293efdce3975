//! Authentication module for filedrop.
//!
//! This module provides the key-file gate guarding the management API and
//! the per-file password check guarding protected downloads.

mod gate;
pub mod password;

pub use gate::{
    authorize_download, clean_key, extract_credential, AccessGate, GateError, KEY_HEADER,
    KEY_QUERY_PARAM,
};
pub use password::{ensure_hashed, hash_password, is_hashed, verify_password, HASH_MARKER};

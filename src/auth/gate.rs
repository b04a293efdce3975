//! Access gate for the management API and for protected downloads.
//!
//! Two independent checks share one way of reading credentials:
//!
//! 1. `Authorization: Bearer <token>`
//! 2. `X-Key: <token>`
//! 3. `?key=<token>`
//!
//! The coarse gate authorizes a request when a file named after the key
//! exists under the auth root. The fine gate compares the credential with the
//! password hash of a single metadata record.

use std::path::PathBuf;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use thiserror::Error;

use crate::file::storage::FORBIDDEN_CHARS;
use crate::file::MetaRecord;

/// Header carrying a raw key.
pub const KEY_HEADER: &str = "x-key";

/// Query parameter carrying a raw key.
pub const KEY_QUERY_PARAM: &str = "key";

/// Gate failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// No credential in any of the accepted places.
    #[error("missing argument: {0}")]
    ArgumentMissing(&'static str),

    /// A credential was present but malformed.
    #[error("invalid argument: {0}")]
    ArgumentInvalid(&'static str),

    /// The credential does not grant access.
    #[error("unauthorized")]
    Unauthorized,
}

/// Read the credential from the request.
///
/// A present but malformed `Authorization` header is an error rather than a
/// reason to fall through to the other sources.
pub fn extract_credential(
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<Option<String>, GateError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| GateError::ArgumentInvalid("Authorization"))?;
        if !value.is_empty() {
            let parts: Vec<&str> = value.split(' ').collect();
            if parts.len() != 2 || !parts[0].eq_ignore_ascii_case("bearer") {
                return Err(GateError::ArgumentInvalid("Authorization"));
            }
            if !parts[1].is_empty() {
                return Ok(Some(parts[1].to_string()));
            }
        }
    }

    if let Some(value) = headers.get(KEY_HEADER) {
        let value = value
            .to_str()
            .map_err(|_| GateError::ArgumentInvalid("X-Key"))?;
        if !value.is_empty() {
            return Ok(Some(value.to_string()));
        }
    }

    Ok(query.and_then(query_key))
}

fn query_key(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name != KEY_QUERY_PARAM || value.is_empty() {
            return None;
        }
        let value = value.replace('+', " ");
        urlencoding::decode(&value).ok().map(|v| v.into_owned())
    })
}

/// Clean a key as a path and return the file name it refers to.
///
/// Empty and `.` segments are dropped, so `./k` and `k/` name `k`. What
/// remains must be a single segment other than `..`, free of control and
/// forbidden characters.
pub fn clean_key(key: &str) -> Option<String> {
    let mut segments = key.split('/').filter(|s| !s.is_empty() && *s != ".");
    let name = segments.next()?;
    if segments.next().is_some() || name == ".." {
        return None;
    }
    if name
        .chars()
        .any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c))
    {
        return None;
    }
    Some(name.to_string())
}

/// Key-file based gate.
#[derive(Debug, Clone)]
pub struct AccessGate {
    auth_root: PathBuf,
}

impl AccessGate {
    /// Create a gate reading keys from `auth_root`.
    pub fn new(auth_root: impl Into<PathBuf>) -> Self {
        Self {
            auth_root: auth_root.into(),
        }
    }

    /// Coarse gate for the management API.
    ///
    /// The existence of `<auth_root>/<key>` is the whole authorization.
    pub fn authorize(&self, headers: &HeaderMap, query: Option<&str>) -> Result<(), GateError> {
        let key = match extract_credential(headers, query) {
            Ok(Some(key)) => key,
            Ok(None) => {
                tracing::error!("Request does not carry a key in its parameters or headers");
                return Err(GateError::ArgumentMissing("X-Key or key"));
            }
            Err(e) => {
                tracing::error!("Request carries an invalid Authorization header");
                return Err(e);
            }
        };

        let Some(key) = clean_key(&key) else {
            tracing::error!("Request carries an invalid key");
            return Err(GateError::ArgumentInvalid("X-Key or key"));
        };

        if !self.auth_root.join(&key).exists() {
            tracing::error!("Key does not exist, not authorized");
            return Err(GateError::Unauthorized);
        }

        Ok(())
    }
}

/// Fine gate for one download.
///
/// Records without a password let everything through. Otherwise every
/// failure collapses into [`GateError::Unauthorized`].
pub fn authorize_download(
    record: &MetaRecord,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<(), GateError> {
    if !record.is_protected() {
        return Ok(());
    }
    tracing::info!(filename = %record.filename, "File is protected by a password");

    let candidate = match extract_credential(headers, query) {
        Ok(Some(candidate)) => candidate,
        Ok(None) | Err(_) => {
            tracing::error!(filename = %record.filename, "Request carries no usable password");
            return Err(GateError::Unauthorized);
        }
    };

    if !record.authenticate(&candidate) {
        tracing::error!(filename = %record.filename, "Password does not match");
        return Err(GateError::Unauthorized);
    }
    Ok(())
}

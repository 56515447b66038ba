//! Caller identity consumed by the base-query filters
//!
//! The identity/permission service is an external collaborator. By the time a
//! query is built, everything the engine needs from it is already resolved:
//! - the caller's identity id
//! - whether the caller is a superuser
//! - the set of row-permission ids the caller is authorized for
//! - which base filters the request asked to skip

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::BaseQueryError;

/// Skip key that bypasses every base filter
pub const SKIP_ALL: &str = "ALL";

/// Base filters a request asked to skip
///
/// Honored only for superusers; see [`AuthContext::skips`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseFilterSkip(Vec<String>);

impl BaseFilterSkip {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    /// Skip every base filter
    pub fn all() -> Self {
        Self(vec![SKIP_ALL.to_string()])
    }

    /// Parse the serialized JSON list sent by the request layer.
    ///
    /// `null` and the empty string mean "skip nothing"; anything other than
    /// a list of strings is rejected.
    pub fn parse(raw: &str) -> Result<Self, BaseQueryError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let invalid = || BaseQueryError::InvalidSkip {
            received: raw.to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|_| invalid())?;
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s),
                    _ => Err(invalid()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self),
            _ => Err(invalid()),
        }
    }

    /// Check if `key` (or `ALL`) was requested
    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key || k == SKIP_ALL)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolved identity of the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Identity id, matched against owner columns
    pub user_id: i64,

    #[serde(default)]
    pub is_superuser: bool,

    /// Row-permission ids the caller is authorized for
    #[serde(default)]
    pub row_permissions: BTreeSet<i64>,

    /// Base filters the request asked to skip
    #[serde(default)]
    pub skip: BaseFilterSkip,
}

impl AuthContext {
    /// A regular user with the given authorized row permissions
    pub fn user(user_id: i64, row_permissions: impl IntoIterator<Item = i64>) -> Self {
        Self {
            user_id,
            is_superuser: false,
            row_permissions: row_permissions.into_iter().collect(),
            skip: BaseFilterSkip::default(),
        }
    }

    /// A superuser with no explicit row permissions
    pub fn superuser(user_id: i64) -> Self {
        Self {
            user_id,
            is_superuser: true,
            row_permissions: BTreeSet::new(),
            skip: BaseFilterSkip::default(),
        }
    }

    pub fn with_row_permissions(mut self, row_permissions: impl IntoIterator<Item = i64>) -> Self {
        self.row_permissions = row_permissions.into_iter().collect();
        self
    }

    pub fn with_skip(mut self, skip: BaseFilterSkip) -> Self {
        self.skip = skip;
        self
    }

    /// Check if the base filter named `key` must be bypassed for this caller
    pub fn skips(&self, key: &str) -> bool {
        self.is_superuser && self.skip.contains(key)
    }
}

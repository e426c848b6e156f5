/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The record envelope shared by every collection instantiation (spec.md
//! §3), and the `Encrypter` seam the host plugs real crypto into.

use crate::error::Result;
use crate::record_id::Id;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// Bound satisfied by any cleartext payload a collection can carry.
/// Corresponds to the source's "CleartextPayload" constraint (spec.md §9).
pub trait CleartextPayload: Clone + Serialize + DeserializeOwned {}

impl<T> CleartextPayload for T where T: Clone + Serialize + DeserializeOwned {}

/// A decrypted record: `(id, payload, modified?, sortindex?, ttl?)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    pub id: Id,
    pub payload: T,
    pub modified: Option<f64>,
    pub sortindex: Option<i32>,
    pub ttl: Option<u32>,
}

impl<T> Record<T> {
    pub fn new(id: impl Into<Id>, payload: T) -> Self {
        Record {
            id: id.into(),
            payload,
            modified: None,
            sortindex: None,
            ttl: None,
        }
    }
}

/// The wire envelope: `{id, payload: "<string>", modified, sortindex, ttl}`,
/// where `payload` is a quoted JSON string. This is what actually crosses
/// the wire; `Encrypter` turns a cleartext `Record<T>` into one of these and
/// back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BsoEnvelope {
    pub id: String,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortindex: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

/// Host-supplied pair that turns cleartext payloads into opaque strings and
/// back. The engine never looks inside `payload`; it only measures the
/// UTF-8 length of what `serialize` returns (spec.md §6). Encryption itself
/// is explicitly out of scope here.
pub trait Encrypter<T> {
    /// Encrypts `record.payload`, returning the full BSO envelope, or
    /// `None` if encryption fails.
    fn serialize(&self, record: &Record<T>) -> Option<BsoEnvelope>;

    /// Decrypts an envelope's payload back into `T`, or `None` on any
    /// failure (bad MAC, bad ciphertext, malformed cleartext JSON).
    fn deserialize(&self, envelope: &BsoEnvelope) -> Option<Record<T>>;
}

/// Result of a POST: `{modified, success, failed, batch?}` (spec.md §3).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PostResult {
    pub modified: f64,
    pub success: Vec<String>,
    pub failed: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
}

impl PostResult {
    pub fn modified_millis(&self) -> u64 {
        (self.modified * 1000.0).round() as u64
    }
}

/// `sort` query parameter for `getSince` (spec.md §4.F, §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOption {
    Newest,
    Oldest,
    Index,
}

impl SortOption {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOption::Newest => "newest",
            SortOption::Oldest => "oldest",
            SortOption::Index => "index",
        }
    }
}

pub(crate) fn parse_post_result(body: &str) -> Result<PostResult> {
    serde_json::from_str(body).map_err(|e| {
        crate::error::ErrorKind::RecordParseError(format!("invalid POST result body: {}", e))
            .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_result_roundtrip() {
        let json = r#"{"modified":1234.567,"success":["a","b"],"failed":{"c":"conflict"}}"#;
        let result: PostResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.modified, 1234.567);
        assert_eq!(result.success, vec!["a", "b"]);
        assert_eq!(result.failed.get("c").unwrap(), "conflict");
        assert_eq!(result.batch, None);
        assert_eq!(result.modified_millis(), 1_234_567);
    }

    #[test]
    fn test_success_failed_disjoint_in_practice() {
        let result = parse_post_result(
            r#"{"modified":1.0,"success":["a"],"failed":{"b":"x"},"batch":"tok"}"#,
        )
        .unwrap();
        let success: std::collections::HashSet<_> = result.success.iter().collect();
        let failed: std::collections::HashSet<_> = result.failed.keys().collect();
        assert!(success.is_disjoint(&failed));
        assert_eq!(result.batch.as_deref(), Some("tok"));
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! High-level operations against the service root (spec.md §4.E): wipe,
//! `info/collections`, `info/configuration`, `meta/global`, `crypto/keys`,
//! and the factory for per-collection clients.

use crate::backoff::BackoffStore;
use crate::collection_client::CollectionClient;
use crate::error::{ErrorKind, Result};
use crate::limits::InfoConfiguration;
use crate::record::{CleartextPayload, Encrypter, Record};
use crate::request::service_root;
use crate::response::StorageResponse;
use crate::transport::{self, Body, HttpTransport, OutgoingRequest, CONTENT_TYPE_JSON};
use log::warn;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use url::Url;

/// Storage client exclusively owns its transport, server URI, and
/// backoff-store handle (spec.md §3 "Ownership"). Collection/batch clients
/// hold an `Rc` back-reference rather than their own copy.
pub struct StorageClient {
    transport: Box<dyn HttpTransport>,
    root: Url,
    backoff: BackoffStore,
}

impl StorageClient {
    pub fn new(transport: Box<dyn HttpTransport>, root: Url) -> Rc<Self> {
        Rc::new(StorageClient {
            transport,
            root: service_root(root),
            backoff: BackoffStore::new(),
        })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    pub fn backoff(&self) -> &BackoffStore {
        &self.backoff
    }

    /// Consulted at the entry of every operation (spec.md §4.E
    /// `checkBackoff`). Fails fast, before any I/O, when a backoff window
    /// is active.
    pub(crate) fn check_backoff(&self) -> Result<()> {
        let now = transport::now_millis();
        if let Some(until) = self.backoff.check(now) {
            return Err(ErrorKind::ServerInBackoff(until).into());
        }
        Ok(())
    }

    pub(crate) fn execute_json<T>(&self, request: OutgoingRequest) -> Result<StorageResponse<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        self.check_backoff()?;
        let route = request.route.clone();
        let outcome = self.transport.execute(request);
        let (value, metadata) = transport::classify_and_parse(&self.backoff, &route, outcome, |raw| {
            serde_json::from_str(&raw.body)
                .map_err(|e| ErrorKind::RecordParseError(format!("{}: {}", route, e)).into())
        })?;
        Ok(StorageResponse::new(value, metadata))
    }

    pub(crate) fn execute_raw(&self, request: OutgoingRequest) -> Result<StorageResponse<String>> {
        self.check_backoff()?;
        let route = request.route.clone();
        let outcome = self.transport.execute(request);
        let (value, metadata) =
            transport::classify_and_parse(&self.backoff, &route, outcome, |raw| Ok(raw.body.clone()))?;
        Ok(StorageResponse::new(value, metadata))
    }

    /// DELETE against the bare service root (spec.md §8 scenario 1).
    pub fn wipe_storage(&self) -> Result<StorageResponse<serde_json::Value>> {
        let request = OutgoingRequest::delete(self.root.clone(), "wipe_storage");
        self.execute_json(request)
    }

    pub fn get_info_collections(&self) -> Result<StorageResponse<HashMap<String, f64>>> {
        let url = self.root.join("info/collections")?;
        let request = OutgoingRequest::get(url, "info/collections");
        self.execute_json(request)
    }

    /// Supplemented feature (SPEC_FULL.md): fetches server-declared limits,
    /// falling back to the documented defaults on 404.
    pub fn get_info_configuration(&self) -> Result<InfoConfiguration> {
        let url = self.root.join("info/configuration")?;
        let request = OutgoingRequest::get(url, "info/configuration");
        match self.execute_json::<InfoConfiguration>(request) {
            Ok(resp) => Ok(resp.value),
            Err(crate::error::Error(ErrorKind::NotFound(_), _)) => {
                warn!("no info/configuration on server, falling back to documented defaults");
                Ok(InfoConfiguration::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_meta_global(&self) -> Result<StorageResponse<serde_json::Value>> {
        let url = self.root.join("storage/meta/global")?;
        let request = OutgoingRequest::get(url, "storage/meta/global");
        let envelope: StorageResponse<crate::record::BsoEnvelope> = self.execute_json(request)?;
        let payload: serde_json::Value = serde_json::from_str(&envelope.value.payload)
            .map_err(|e| ErrorKind::RecordParseError(format!("meta/global payload: {}", e)))?;
        Ok(StorageResponse::new(payload, envelope.metadata))
    }

    pub fn upload_meta_global(
        &self,
        meta_global: &serde_json::Value,
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<u64>> {
        let payload = serde_json::to_string(meta_global)
            .map_err(|_| ErrorKind::MalformedMetaGlobalError)?;
        let envelope = crate::record::BsoEnvelope {
            id: "global".to_owned(),
            payload,
            modified: None,
            sortindex: None,
            ttl: None,
        };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|_| ErrorKind::MalformedMetaGlobalError)?;
        let url = self.root.join("storage/meta/global")?;
        let request = OutgoingRequest::put(
            url,
            Body {
                bytes,
                content_type: CONTENT_TYPE_JSON,
            },
            "storage/meta/global",
        )
        .if_unmodified_since(if_unmodified_since);
        let resp = self.execute_raw(request)?;
        let millis = parse_timestamp_body(&resp.value)?;
        Ok(StorageResponse::new(millis, resp.metadata))
    }

    /// Bootstrap: the only collection whose records are encrypted under
    /// the sync-key bundle rather than the per-collection bulk keys
    /// (spec.md §4.E).
    pub fn get_crypto_keys<T: CleartextPayload>(
        self: &Rc<Self>,
        sync_key_encrypter: Arc<dyn Encrypter<T>>,
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<Record<T>>> {
        let client = self.client_for_collection("crypto", sync_key_encrypter)?;
        let _ = if_unmodified_since; // GET has no conditional semantics here
        client.get("keys")
    }

    pub fn upload_crypto_keys<T: CleartextPayload>(
        self: &Rc<Self>,
        keys: &Record<T>,
        sync_key_encrypter: Arc<dyn Encrypter<T>>,
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<u64>> {
        let client = self.client_for_collection("crypto", sync_key_encrypter)?;
        client.put(keys, if_unmodified_since)
    }

    pub fn client_for_collection<T: CleartextPayload>(
        self: &Rc<Self>,
        collection: &str,
        encrypter: Arc<dyn Encrypter<T>>,
    ) -> Result<Rc<CollectionClient<T>>> {
        CollectionClient::new(Rc::clone(self), collection, encrypter)
    }
}

fn parse_timestamp_body(body: &str) -> Result<u64> {
    let seconds: f64 = body
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| ErrorKind::RecordParseError(format!("not a decimal timestamp: {}", body)))?;
    Ok((seconds * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_body() {
        assert_eq!(parse_timestamp_body("1234567890.123").unwrap(), 1_234_567_890_123);
        assert_eq!(parse_timestamp_body("\"1.0\"").unwrap(), 1_000);
        assert!(parse_timestamp_body("nope").is_err());
    }
}

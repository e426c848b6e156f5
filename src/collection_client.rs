/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Typed GET/PUT/POST over a single collection (spec.md §4.F).

use crate::batch::BatchClient;
use crate::error::{ErrorKind, Result};
use crate::record::{BsoEnvelope, CleartextPayload, Encrypter, PostResult, Record, SortOption};
use crate::request::{self, GetSinceParams};
use crate::response::StorageResponse;
use crate::storage_client::StorageClient;
use crate::transport::{Body, OutgoingRequest, CONTENT_TYPE_JSON, CONTENT_TYPE_NEWLINES};
use std::rc::Rc;
use std::sync::Arc;
use url::Url;

pub struct CollectionClient<T> {
    pub(crate) storage: Rc<StorageClient>,
    pub(crate) collection: String,
    collection_uri: Url,
    encrypter: Arc<dyn Encrypter<T>>,
}

impl<T: CleartextPayload> CollectionClient<T> {
    pub(crate) fn new(
        storage: Rc<StorageClient>,
        collection: &str,
        encrypter: Arc<dyn Encrypter<T>>,
    ) -> Result<Rc<Self>> {
        let collection_uri = request::collection_uri(storage.root(), collection)?;
        Ok(Rc::new(CollectionClient {
            storage,
            collection: collection.to_owned(),
            collection_uri,
            encrypter,
        }))
    }

    pub fn collection_uri(&self) -> &Url {
        &self.collection_uri
    }

    /// Returns the full JSON envelope string for `record`, or `None` if
    /// encryption fails (spec.md §4.F).
    pub fn serialize_record(&self, record: &Record<T>) -> Option<String> {
        let envelope = self.encrypter.serialize(record)?;
        serde_json::to_string(&envelope).ok()
    }

    pub fn get(&self, guid: &str) -> Result<StorageResponse<Record<T>>> {
        let url = request::record_uri(&self.collection_uri, guid)?;
        let route = format!("{}/{}", self.collection, guid);
        let request = OutgoingRequest::get(url, route.clone());
        let resp: StorageResponse<BsoEnvelope> = self.storage.execute_json(request)?;
        let record = self.encrypter.deserialize(&resp.value).ok_or_else(|| {
            ErrorKind::RecordParseError(format!("could not decrypt record {}", route))
        })?;
        Ok(StorageResponse::new(record, resp.metadata))
    }

    pub fn get_since(
        &self,
        since_millis: u64,
        sort: Option<SortOption>,
        limit: Option<u64>,
        offset: Option<String>,
    ) -> Result<StorageResponse<Vec<Record<T>>>> {
        let mut url = self.collection_uri.clone();
        let params = GetSinceParams {
            newer_than: Some(since_millis as f64 / 1000.0),
            sort,
            limit,
            offset,
        };
        params.apply_to(&mut url);
        let request = OutgoingRequest::get(url, self.collection.clone());
        let resp: StorageResponse<Vec<BsoEnvelope>> = self.storage.execute_json(request)?;
        // Malformed/undecryptable envelopes are silently dropped (spec.md §4.F).
        let records = resp
            .value
            .iter()
            .filter_map(|envelope| self.encrypter.deserialize(envelope))
            .collect();
        Ok(StorageResponse::new(records, resp.metadata))
    }

    /// POSTs a batch of records in one request, newline-framed. Records
    /// that fail to serialize are filtered out silently — the batch layer
    /// is responsible for catching over-large records before this point
    /// (spec.md §4.F).
    pub fn post(
        &self,
        records: &[Record<T>],
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<PostResult>> {
        let lines: Vec<String> = records
            .iter()
            .filter_map(|r| self.serialize_record(r))
            .collect();
        self.post_lines(&lines, None, false, if_unmodified_since)
    }

    pub fn put(
        &self,
        record: &Record<T>,
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<u64>> {
        let serialized = self.serialize_record(record).ok_or_else(|| {
            ErrorKind::RecordParseError(format!("could not encrypt record {}", record.id))
        })?;
        let url = request::record_uri(&self.collection_uri, &record.id)?;
        let route = format!("{}/{}", self.collection, record.id);
        let request = OutgoingRequest::put(
            url,
            Body {
                bytes: serialized.into_bytes(),
                content_type: CONTENT_TYPE_JSON,
            },
            route,
        )
        .if_unmodified_since(if_unmodified_since);
        let resp = self.storage.execute_raw(request)?;
        let millis = parse_plain_timestamp(&resp.value)?;
        Ok(StorageResponse::new(millis, resp.metadata))
    }

    /// Low-level newline-framed POST used both by the friendly `post()`
    /// above and by the batch state machine, which already has serialized
    /// lines and batch/commit query parameters to attach (spec.md §4.G).
    pub(crate) fn post_lines(
        &self,
        lines: &[String],
        batch: Option<&str>,
        commit: bool,
        if_unmodified_since: Option<u64>,
    ) -> Result<StorageResponse<PostResult>> {
        let mut url = self.collection_uri.clone();
        request::apply_batch_params(&mut url, batch, commit);
        let body = lines.join("\n");
        let request = OutgoingRequest::post(
            url,
            Body {
                bytes: body.into_bytes(),
                content_type: CONTENT_TYPE_NEWLINES,
            },
            self.collection.clone(),
        )
        .if_unmodified_since(if_unmodified_since);
        self.storage.execute_json(request)
    }

    pub fn new_batch_operation(self: &Rc<Self>) -> BatchClient<T> {
        BatchClient::new(Rc::clone(self))
    }
}

fn parse_plain_timestamp(body: &str) -> Result<u64> {
    let seconds: f64 = body
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| ErrorKind::RecordParseError(format!("not a decimal timestamp: {}", body)))?;
    Ok((seconds * 1000.0).round() as u64)
}

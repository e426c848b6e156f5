/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Request builder (spec.md §4.C) and error classifier / `errorWrap`
//! (spec.md §4.D) in one file, the way the teacher keeps request
//! construction and `exec_request` together in `storage_client.rs`.

use crate::auth::Authorizer;
use crate::backoff::BackoffStore;
use crate::error::{Error, ErrorKind, Result};
use crate::response::ResponseMetadata;
use log::{error, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

pub const CONTENT_TYPE_JSON: &str = "application/json;charset=utf-8";
pub const CONTENT_TYPE_NEWLINES: &str = "application/newlines";

/// A request body, already serialized, along with its content type.
pub struct Body {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Everything needed to issue one HTTP request, already fully built except
/// for the `Authorization` header, which is attached at dispatch time so
/// callers never have to think about it (spec.md §4.C: "all requests are
/// handed to an authorizer").
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<Body>,
    pub if_unmodified_since_millis: Option<u64>,
    /// Human-readable route, used only in error messages.
    pub route: String,
}

impl OutgoingRequest {
    pub fn get(url: Url, route: impl Into<String>) -> Self {
        OutgoingRequest {
            method: Method::GET,
            url,
            body: None,
            if_unmodified_since_millis: None,
            route: route.into(),
        }
    }

    pub fn delete(url: Url, route: impl Into<String>) -> Self {
        OutgoingRequest {
            method: Method::DELETE,
            url,
            body: None,
            if_unmodified_since_millis: None,
            route: route.into(),
        }
    }

    pub fn put(url: Url, body: Body, route: impl Into<String>) -> Self {
        OutgoingRequest {
            method: Method::PUT,
            url,
            body: Some(body),
            if_unmodified_since_millis: None,
            route: route.into(),
        }
    }

    pub fn post(url: Url, body: Body, route: impl Into<String>) -> Self {
        OutgoingRequest {
            method: Method::POST,
            url,
            body: Some(body),
            if_unmodified_since_millis: None,
            route: route.into(),
        }
    }

    pub fn if_unmodified_since(mut self, millis: Option<u64>) -> Self {
        self.if_unmodified_since_millis = millis;
        self
    }
}

/// A response reduced to what the classifier and callers need: status,
/// headers, and the body read fully into memory. Reading the body eagerly
/// (rather than streaming) matches the teacher's `resp.json()` pattern and
/// keeps the classifier a pure function of `(status, headers)`.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// The request builder + transport boundary. Abstracted as a trait so
/// tests substitute an in-memory fake instead of a live server — grounded
/// in the teacher's `SetupStorageClient` trait, which exists for the same
/// mocking purpose (`client.rs`).
pub trait HttpTransport: Send + Sync {
    /// Issues the request. `Ok` means "a response came back", regardless
    /// of status code; `Err` means transport failure (no usable response).
    fn execute(&self, request: OutgoingRequest) -> std::result::Result<RawResponse, String>;
}

pub struct ReqwestTransport {
    client: Client,
    authorizer: Arc<dyn Authorizer>,
}

impl ReqwestTransport {
    pub fn new(client: Client, authorizer: Arc<dyn Authorizer>) -> Self {
        ReqwestTransport { client, authorizer }
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: OutgoingRequest) -> std::result::Result<RawResponse, String> {
        let mut builder = self.client.request(request.method.clone(), request.url.clone());

        builder = match crate::auth::apply_authorization(
            builder,
            self.authorizer.as_ref(),
            &request.method,
            &request.url,
        ) {
            Ok(b) => b,
            Err(e) => return Err(e.to_string()),
        };

        match request.method {
            Method::GET => {
                builder = builder.header(reqwest::header::ACCEPT, "application/json");
            }
            Method::DELETE => {
                builder = builder.header("X-Confirm-Delete", "1");
            }
            _ => {}
        }

        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, body.content_type)
                .body(body.bytes.clone());
        }

        if let Some(millis) = request.if_unmodified_since_millis {
            builder = builder.header(
                "X-If-Unmodified-Since",
                crate::request::millis_to_decimal_seconds(millis),
            );
        }

        let response = builder.send().map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().map_err(|e| e.to_string())?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The error classifier (spec.md §4.D): always decodes headers and updates
/// backoff first, regardless of whether the transport call ultimately
/// succeeds, then maps the status code into the error taxonomy.
fn classify_status(route: &str, status: u16, metadata: &ResponseMetadata) -> Option<Error> {
    if status >= 500 {
        Some(ErrorKind::ServerError(metadata.clone()).into())
    } else if status == 404 {
        Some(ErrorKind::NotFound(metadata.clone()).into())
    } else if status >= 400 {
        Some(ErrorKind::BadRequestError(route.to_owned(), metadata.clone()).into())
    } else {
        None
    }
}

/// Wraps a transport completion (spec.md §4.D `errorWrap`). On success,
/// decodes metadata, updates backoff, classifies the status, and — if
/// nothing went wrong — hands the raw body to `parse`.
pub(crate) fn classify_and_parse<T>(
    backoff: &BackoffStore,
    route: &str,
    outcome: std::result::Result<RawResponse, String>,
    parse: impl FnOnce(&RawResponse) -> Result<T>,
) -> Result<(T, ResponseMetadata)> {
    match outcome {
        Err(message) => Err(ErrorKind::RequestError(message).into()),
        Ok(raw) => {
            let metadata = ResponseMetadata::from_parts(raw.status, &raw.headers);
            if let Some(millis) = metadata.requested_backoff_millis() {
                warn!("server asked for {}ms of backoff during \"{}\"", millis, route);
                backoff.set_until(now_millis() + millis);
            }
            if let Some(err) = classify_status(route, raw.status, &metadata) {
                error!("HTTP {} during storage request to \"{}\"", raw.status, route);
                return Err(err);
            }
            let value = parse(&raw)?;
            Ok((value, metadata))
        }
    }
}

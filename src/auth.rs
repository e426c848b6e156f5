/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Authorization is an external collaborator (spec.md §6): the engine never
//! signs a request itself, it just calls a host-supplied function that
//! attaches `Authorization`. This module ships the default HAWK-over-token
//! implementation, grounded in the teacher's `token.rs`, minus the
//! token-server *fetch* flow (out of scope, spec.md §1).

use crate::error::{ErrorKind, Result};
use reqwest::blocking::RequestBuilder;
use reqwest::Method;
use std::borrow::Cow;

/// Attaches `Authorization` to an outgoing request. Implementors receive
/// the method and URL rather than a half-built `reqwest::RequestBuilder` so
/// they stay decoupled from the transport's request-building internals.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, method: &Method, url: &url::Url) -> Result<String>;
}

/// Attach a token already fetched from the token server. The engine does
/// not know how to fetch one (spec.md §1); the host obtains `id`/`key` out
/// of band and hands them here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncToken {
    pub id: String,
    pub key: String,
}

/// Default `Authorizer`: signs each request with HAWK, keyed by
/// `(token.id, token.key)`, the way `hawk::RequestBuilder` is used in the
/// teacher's `TokenContext::authorization`.
pub struct HawkAuthorizer {
    credentials: hawk::Credentials,
}

impl HawkAuthorizer {
    pub fn new(token: &SyncToken) -> Result<Self> {
        let key = hawk::Key::new(token.key.as_bytes(), hawk::SHA256)?;
        Ok(HawkAuthorizer {
            credentials: hawk::Credentials {
                id: token.id.clone(),
                key,
            },
        })
    }
}

impl Authorizer for HawkAuthorizer {
    fn authorize(&self, method: &Method, url: &url::Url) -> Result<String> {
        let path_and_query = match url.query() {
            None => Cow::from(url.path()),
            Some(qs) => Cow::from(format!("{}?{}", url.path(), qs)),
        };
        let host = url
            .host_str()
            .ok_or_else(|| ErrorKind::UnacceptableUrl("storage URL has no host".into()))?;
        let port = url.port_or_known_default().ok_or_else(|| {
            ErrorKind::UnacceptableUrl(
                "storage URL has no port and no default port is known for the scheme".into(),
            )
        })?;

        let header = hawk::RequestBuilder::new(method.as_str(), host, port, &path_and_query)
            .request()
            .make_header(&self.credentials)?;
        Ok(format!("Hawk {}", header))
    }
}

pub(crate) fn apply_authorization(
    builder: RequestBuilder,
    authorizer: &dyn Authorizer,
    method: &Method,
    url: &url::Url,
) -> Result<RequestBuilder> {
    let value = authorizer.authorize(method, url)?;
    Ok(builder.header(reqwest::header::AUTHORIZATION, value))
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! URL construction for the storage wire protocol (spec.md §4.C, §4.H,
//! §6). Building these by hand instead of a join-everything URL helper is
//! deliberate: the trailing-slash trap (spec.md §9) means we never want a
//! library silently normalizing `root` vs `root/`.

use crate::error::{unexpected, Result};
use crate::record::SortOption;
use url::Url;

/// Strips a single trailing `/` from the service root, the way the
/// teacher's `api_endpoint()` is always used bare. A wipe against the root
/// means "drop user"; a wipe against `root/` means "delete an empty
/// collection named \"\"" — very much not the same request.
pub fn service_root(mut root: Url) -> Url {
    if root.path().ends_with('/') {
        let trimmed = root.path().trim_end_matches('/').to_owned();
        root.set_path(&trimmed);
    }
    root
}

/// `<root>/storage/<collection>`, preserving the no-trailing-slash
/// property of `root`.
pub fn collection_uri(root: &Url, collection: &str) -> Result<Url> {
    let mut url = root.clone();
    url.path_segments_mut()
        .map_err(|_| unexpected("storage root is not a base URL"))?
        .push("storage")
        .push(collection);
    Ok(url)
}

pub fn record_uri(collection_uri: &Url, guid: &str) -> Result<Url> {
    let mut url = collection_uri.clone();
    url.path_segments_mut()
        .map_err(|_| unexpected("collection URI is not a base URL"))?
        .push(guid);
    Ok(url)
}

/// Query parameters for `GET <collection>` (spec.md §4.F `getSince`).
#[derive(Debug, Clone, Default)]
pub struct GetSinceParams {
    pub newer_than: Option<f64>,
    pub sort: Option<SortOption>,
    pub limit: Option<u64>,
    pub offset: Option<String>,
}

impl GetSinceParams {
    pub fn apply_to(&self, url: &mut Url) {
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("full", "1");
            if let Some(newer) = self.newer_than {
                pairs.append_pair("newer", &format_decimal_seconds(newer));
            }
            if let Some(offset) = &self.offset {
                pairs.append_pair("offset", offset);
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(sort) = self.sort {
                pairs.append_pair("sort", sort.as_str());
            }
        }
        strip_bare_query_mark(url);
    }
}

/// `?batch=true|<token>[&commit=true]` (spec.md §4.G).
pub fn apply_batch_params(url: &mut Url, batch: Option<&str>, commit: bool) {
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(token) = batch {
            pairs.append_pair("batch", token);
        }
        if commit {
            pairs.append_pair("commit", "true");
        }
    }
    strip_bare_query_mark(url);
}

fn strip_bare_query_mark(url: &mut Url) {
    if url.query() == Some("") {
        url.set_query(None);
    }
}

/// Converts a millisecond timestamp to the three-decimal-second string the
/// wire protocol uses for `X-If-Unmodified-Since` and `newer`/`older`
/// (spec.md §4.C).
pub fn format_decimal_seconds(value: f64) -> String {
    format!("{:.3}", value)
}

pub fn millis_to_decimal_seconds(millis: u64) -> String {
    format_decimal_seconds(millis as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_root_strips_trailing_slash() {
        let root = Url::parse("https://example.com/1.5/uid/").unwrap();
        assert_eq!(service_root(root).as_str(), "https://example.com/1.5/uid");
    }

    #[test]
    fn test_collection_uri() {
        let root = Url::parse("https://example.com/1.5/uid").unwrap();
        let uri = collection_uri(&root, "bookmarks").unwrap();
        assert_eq!(uri.as_str(), "https://example.com/1.5/uid/storage/bookmarks");
    }

    #[test]
    fn test_get_since_params() {
        let root = Url::parse("https://example.com/1.5/uid").unwrap();
        let mut url = collection_uri(&root, "history").unwrap();
        let params = GetSinceParams {
            newer_than: Some(1_600_000_000.0),
            sort: Some(SortOption::Oldest),
            limit: Some(50),
            offset: None,
        };
        params.apply_to(&mut url);
        assert_eq!(
            url.as_str(),
            "https://example.com/1.5/uid/storage/history?full=1&newer=1600000000.000&limit=50&sort=oldest"
        );
    }

    #[test]
    fn test_millis_to_decimal_seconds() {
        assert_eq!(millis_to_decimal_seconds(1_600_000_000_123), "1600000000.123");
    }
}

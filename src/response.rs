/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Decodes the `X-Weave-*` response headers into a typed, pure value.
//!
//! This is total and side-effect free: missing or malformed headers yield
//! `None`, never an error (spec.md §4.A).

use reqwest::header::HeaderMap;

/// `(value, ResponseMetadata)` returned by every successful storage
/// operation.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageResponse<T> {
    pub value: T,
    pub metadata: ResponseMetadata,
}

impl<T> StorageResponse<T> {
    pub fn new(value: T, metadata: ResponseMetadata) -> Self {
        StorageResponse { value, metadata }
    }
}

/// Read-only decoded view of a storage response's headers and status.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseMetadata {
    pub status: u16,
    pub alert: Option<String>,
    pub next_offset: Option<String>,
    pub records: Option<u64>,
    pub quota_remaining: Option<i64>,
    pub timestamp_millis: u64,
    pub last_modified_millis: Option<u64>,
    pub backoff_millis: Option<u64>,
    pub retry_after_millis: Option<u64>,
}

impl ResponseMetadata {
    pub fn from_parts(status: u16, headers: &HeaderMap) -> ResponseMetadata {
        // `X-Weave-Backoff`/`X-Backoff` take precedence over `Retry-After`
        // when both are present (spec.md §3).
        let backoff_millis = optional_seconds_header(headers, "x-weave-backoff")
            .or_else(|| optional_seconds_header(headers, "x-backoff"));
        let retry_after_millis = optional_seconds_header(headers, "retry-after");

        ResponseMetadata {
            status,
            alert: header_str(headers, "x-weave-alert"),
            next_offset: header_str(headers, "x-weave-next-offset"),
            records: header_str(headers, "x-weave-records").and_then(|s| s.parse().ok()),
            quota_remaining: header_str(headers, "x-weave-quota-remaining")
                .and_then(|s| s.parse().ok()),
            timestamp_millis: optional_seconds_header(headers, "x-weave-timestamp").unwrap_or(0),
            last_modified_millis: optional_seconds_header(headers, "x-last-modified"),
            backoff_millis,
            retry_after_millis,
        }
    }

    /// The backoff duration this response asked for, if any, preferring
    /// `backoff_millis` over `retry_after_millis` per spec.md §3.
    pub fn requested_backoff_millis(&self) -> Option<u64> {
        self.backoff_millis.or(self.retry_after_millis)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_owned())
}

/// Parses a header that is a decimal-seconds string, an integer-seconds
/// string, or any other numeric string, into milliseconds. Returns `None`
/// on absence or malformed content — never an error (spec.md §4.A, §8
/// property 5).
fn optional_seconds_header(headers: &HeaderMap, name: &str) -> Option<u64> {
    let raw = header_str(headers, name)?;
    let seconds: f64 = raw.parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some((seconds * 1000.0) as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use std::str::FromStr;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                HeaderName::from_str(k).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_optional_seconds_header_forms() {
        let h = headers(&[("x-weave-timestamp", "1.234")]);
        assert_eq!(
            optional_seconds_header(&h, "x-weave-timestamp"),
            Some(1234)
        );
        let h = headers(&[("x-weave-timestamp", "1")]);
        assert_eq!(
            optional_seconds_header(&h, "x-weave-timestamp"),
            Some(1000)
        );
        let h = HeaderMap::new();
        assert_eq!(optional_seconds_header(&h, "x-weave-timestamp"), None);
    }

    #[test]
    fn test_backoff_precedence() {
        let h = headers(&[("x-weave-backoff", "30"), ("retry-after", "5")]);
        let meta = ResponseMetadata::from_parts(200, &h);
        assert_eq!(meta.requested_backoff_millis(), Some(30_000));
    }

    #[test]
    fn test_retry_after_fallback() {
        let h = headers(&[("retry-after", "5")]);
        let meta = ResponseMetadata::from_parts(200, &h);
        assert_eq!(meta.requested_backoff_millis(), Some(5_000));
    }

    #[test]
    fn test_malformed_header_is_none_not_error() {
        let h = headers(&[("x-weave-timestamp", "not-a-number")]);
        let meta = ResponseMetadata::from_parts(200, &h);
        assert_eq!(meta.timestamp_millis, 0);
    }
}

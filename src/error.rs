/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use crate::response::ResponseMetadata;

error_chain! {
    foreign_links {
        JsonError(::serde_json::Error);
        BadUrl(::url::ParseError);
        Reqwest(::reqwest::Error);
        HawkError(::hawk::Error);
    }
    errors {
        // Pre-flight refusal: a prior response told us to back off and the
        // window hasn't elapsed. No network activity occurs when this is
        // returned.
        ServerInBackoff(until_millis: u64) {
            description("server asked us to back off and the backoff window hasn't elapsed")
            display("server in backoff until {} (ms since epoch)", until_millis)
        }

        // Transport failure with no usable response at all (spec.md §7).
        RequestError(message: String) {
            description("request failed before a response was received")
            display("request failed: {}", message)
        }

        ServerError(meta: ResponseMetadata) {
            description("server returned a 5xx status")
            display("server error, status {}", meta.status)
        }

        NotFound(meta: ResponseMetadata) {
            description("server returned 404")
            display("not found, status {}", meta.status)
        }

        BadRequestError(route: String, meta: ResponseMetadata) {
            description("server returned a 4xx status other than 404")
            display("bad request to \"{}\", status {}", route, meta.status)
        }

        RecordParseError(message: String) {
            description("response body could not be parsed into the expected shape")
            display("record parse error: {}", message)
        }

        MalformedMetaGlobalError {
            description("meta/global payload failed to serialize")
            display("meta/global payload failed to serialize")
        }

        RecordTooLargeError(guid: String, size: usize) {
            description("a record exceeds the maximum size the server will accept")
            display("record {} is {} bytes, exceeding the per-record limit", guid, size)
        }

        // The multi-batch case from spec.md's open question: rather than
        // silently succeeding without uploading anything, we fail loudly.
        BatchTooLarge(count: usize, bytes: usize) {
            description("record set exceeds both single-POST and single-batch limits")
            display("record set ({} records, {} bytes) exceeds batch limits; splitting across \
                      multiple batches is not implemented", count, bytes)
        }

        UnacceptableUrl(message: String) {
            description("URL is missing a piece required to authorize a request")
            display("unacceptable URL: {}", message)
        }

        UnexpectedError(message: String) {
            description("an invariant the engine relies on did not hold")
            display("unexpected error: {}", message)
        }
    }
}

pub fn unexpected<S>(s: S) -> Error
where
    S: Into<String>,
{
    ErrorKind::UnexpectedError(s.into()).into()
}

/// Marker used internally by the batch state machine to signal that the
/// server doesn't support the `batch` protocol extension. Never surfaced to
/// callers (spec.md §7: "internal only").
#[derive(Debug)]
pub(crate) struct BatchingNotSupported;

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Server-declared and hard-coded size/count limits (spec.md §3).

use serde::{Deserialize, Serialize};

/// Hard, client-enforced record size limit, independent of server config:
/// roughly 256 KiB minus 4 bytes of envelope overhead.
pub const MAX_RECORD_SIZE_BYTES: usize = 262_140;

/// Hard, client-enforced payload (single POST/chunk) size limit.
pub const MAX_PAYLOAD_SIZE_BYTES: usize = 1_000_000;

/// Hard, client-enforced item count per payload.
pub const MAX_PAYLOAD_ITEM_COUNT: usize = 100;

/// Server-declared limits for the current sync session, fetched from
/// `info/configuration` and treated as immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InfoConfiguration {
    pub max_request_bytes: u64,
    pub max_post_records: u64,
    pub max_post_bytes: u64,
    pub max_batch_records: u64,
    pub max_batch_bytes: u64,
}

impl Default for InfoConfiguration {
    fn default() -> Self {
        InfoConfiguration {
            max_request_bytes: 1_048_576,
            max_post_records: 100,
            max_post_bytes: 1_048_576,
            max_batch_records: 10_000,
            max_batch_bytes: 104_857_600,
        }
    }
}

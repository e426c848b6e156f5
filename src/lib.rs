/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

// `error_chain!` can recurse deeply and I guess we're just supposed to live with that...
#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;

// TODO: Some of these don't need to be pub...
pub mod auth;
pub mod backoff;
pub mod batch;
pub mod collection_client;
pub mod error;
pub mod limits;
pub mod record;
pub mod record_id;
pub mod request;
pub mod response;
pub mod storage_client;
pub mod transport;

// Re-export the types callers are likely to want for convenience.
pub use auth::{Authorizer, HawkAuthorizer, SyncToken};
pub use backoff::BackoffStore;
pub use batch::BatchClient;
pub use collection_client::CollectionClient;
pub use error::{Error, ErrorKind, Result};
pub use limits::InfoConfiguration;
pub use record::{BsoEnvelope, CleartextPayload, Encrypter, PostResult, Record, SortOption};
pub use record_id::Id;
pub use response::{ResponseMetadata, StorageResponse};
pub use storage_client::StorageClient;
pub use transport::{HttpTransport, ReqwestTransport};

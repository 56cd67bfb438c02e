//! Service layer: wire codec, endpoints, pagination and enrichment.

pub mod api;
pub mod codec;
pub mod enricher;
pub mod paginator;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{ApiRequest, Endpoints, Envelope, Fetcher, RequestKind};
pub use codec::Codec;
pub use enricher::{Admission, Pending, TrendEnricher};
pub use paginator::{ListPage, Paginator, total_pages};

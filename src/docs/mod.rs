//! Offline document cache: cache-first resolution of paper PDFs with
//! streamed downloads and size-capped eviction.

mod fetch;

pub use fetch::{
    DocumentError, DocumentFetcher, DocumentSource, ResolvedDocument, DEFAULT_CACHE_CAP_BYTES,
};

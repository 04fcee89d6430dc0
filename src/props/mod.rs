//! Per-item property updates driven through the dispatch pipeline.

pub mod encode;
pub mod item;
pub mod service;

pub use encode::{Properties, encode_delete_keys, query_escape};
pub use item::{Property, ResultItem};
pub use service::{PropsClient, PropsParams, PropsService};

//! Exchange rate caching and refresh.
//!
//! The cache holds the last successfully fetched rate table and converts
//! amounts between currencies without ever blocking on network I/O.
//! Subscribers registered with the cache are notified asynchronously after
//! every refresh that changes the rates.

mod cache;
mod source;

pub use cache::{RateCache, RateTable};
pub use source::{CentralBankSource, RateError, RateSource};

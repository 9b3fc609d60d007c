//! Tickerlens Core - live crypto price resolution for the rankings dashboard.
//!
//! This module provides:
//! - Best-available price per symbol from streaming ticks, last-known ticks
//!   and snapshot prices, in strict priority order
//! - Binance tradable-symbol listing and combined ticker stream
//! - Batched snapshot fetches against the internal coin index API
//! - A session owning the resolver and its background tasks, with
//!   reconnect backoff and explicit teardown

pub mod clients;
pub mod error;
pub mod models;
pub mod reconnect;
pub mod resolver;
pub mod session;
pub mod symbols;
pub mod utils;

pub use error::{PriceFeedError, PriceFeedResult};
pub use models::{PriceData, PriceObservation, PriceSource, SnapshotRecord};
pub use resolver::{LivePriceResolver, ResolverConfig, ResolverStats, SnapshotFetch};
pub use session::{PriceSession, SessionConfig};

//! Harvest pipeline: rendered-page fetching, snapshot serialization, and the
//! capacity-bounded storage client, tied together by the cycle runner.

pub mod config;
pub mod fetch;
pub mod pipeline;
pub mod snapshot;
pub mod store;

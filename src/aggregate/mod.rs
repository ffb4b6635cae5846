// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Range summaries: a streaming engine that folds entries in bounded memory,
//! and a service that prefers precomputed daily summaries and falls back to
//! streaming.

pub mod pages;
mod reservoir;
pub mod service;
pub mod stream;

pub use pages::{LocalPages, PageSource, RemotePages};
pub use reservoir::Reservoir;
pub use service::{AggregateOptions, AggregateService};
pub use stream::{aggregate_for_range, aggregate_from_pages, AggregateRecord, Point, StreamOptions};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("aggregation cancelled")]
    Cancelled,
    #[error("could not read entries: {0:#}")]
    Source(anyhow::Error),
}

// Copyright (C) 2025-present The Minutely Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-minute sliding-window analytics over delivery events.
//!
//! - [`event`]: the [`event::Event`] record read from the input and the
//!   [`event::MinuteResult`] emitted for every elapsed minute
//! - [`metrics`]: the [`metrics::Metric`] strategies and the
//!   [`metrics::MetricRegistry`] used to select one by name
//! - [`aggregation`]: the [`aggregation::SlidingWindowAggregator`] engine and
//!   iterator/stream adaptors built on top of it

pub mod aggregation;
pub mod event;
pub mod metrics;

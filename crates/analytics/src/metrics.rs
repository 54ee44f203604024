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

//! Metrics computed over the events of a window.
//!
//! Every metric returns `0` for an empty window, so a reported `0` can mean
//! either "no data" or a genuine zero duration.

use crate::aggregation::AggregationError;
use std::{collections::BTreeMap, fmt::Debug};

/// A pure function from the durations currently in the window to one value
pub trait Metric: Debug + Send + Sync {
    /// Name used to select the metric in the configuration
    fn name(&self) -> &'static str;

    /// Name of the value field in the emitted results
    fn output_field(&self) -> &'static str;

    fn compute(&self, values: &mut dyn Iterator<Item = f64>) -> f64;
}

/// Arithmetic mean of the durations in the window
#[derive(Debug, Default, Clone, Copy)]
pub struct MovingAverage;

impl Metric for MovingAverage {
    fn name(&self) -> &'static str {
        "moving_average"
    }

    fn output_field(&self) -> &'static str {
        "average_delivery_time"
    }

    fn compute(&self, values: &mut dyn Iterator<Item = f64>) -> f64 {
        let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), value| {
            (sum + value, count + 1)
        });
        if count == 0 {
            return 0.0;
        }
        sum / count as f64
    }
}

/// Largest duration in the window
#[derive(Debug, Default, Clone, Copy)]
pub struct Maximum;

impl Metric for Maximum {
    fn name(&self) -> &'static str {
        "maximum"
    }

    fn output_field(&self) -> &'static str {
        "max_delivery_time"
    }

    fn compute(&self, values: &mut dyn Iterator<Item = f64>) -> f64 {
        values.reduce(f64::max).unwrap_or(0.0)
    }
}

pub type MetricConstructor = fn() -> Box<dyn Metric>;

/// Maps metric names to their constructors.
///
/// The registry is a plain value owned by whoever builds the aggregator,
/// [`MetricRegistry::default`] knows about [`MovingAverage`] and [`Maximum`].
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    constructors: BTreeMap<&'static str, MetricConstructor>,
}

impl MetricRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a metric under the name it reports, replacing any previous
    /// metric with the same name.
    pub fn register(&mut self, constructor: MetricConstructor) -> &mut Self {
        let name = constructor().name();
        self.constructors.insert(name, constructor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered metric names in lexicographic order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    pub fn build(&self, name: &str) -> Result<Box<dyn Metric>, AggregationError> {
        match self.constructors.get(name) {
            Some(constructor) => Ok(constructor()),
            None => Err(AggregationError::UnsupportedMetric {
                name: name.to_string(),
                supported: self.names().collect::<Vec<_>>().join(", "),
            }),
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(|| Box::new(MovingAverage))
            .register(|| Box::new(Maximum));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(metric: &dyn Metric, values: &[f64]) -> f64 {
        metric.compute(&mut values.iter().copied())
    }

    #[test]
    fn test_moving_average() {
        assert_eq!(compute(&MovingAverage, &[10.0, 20.0]), 15.0);
        assert_eq!(compute(&MovingAverage, &[10.0, 20.0, 60.0]), 30.0);
        assert_eq!(compute(&MovingAverage, &[0.0]), 0.0);
    }

    #[test]
    fn test_maximum() {
        assert_eq!(compute(&Maximum, &[10.0, 54.0, 20.0]), 54.0);
        assert_eq!(compute(&Maximum, &[3.5]), 3.5);
    }

    #[test]
    fn test_empty_window_is_zero() {
        assert_eq!(compute(&MovingAverage, &[]), 0.0);
        assert_eq!(compute(&Maximum, &[]), 0.0);
    }

    #[test]
    fn test_average_within_bounds() {
        let samples: [&[f64]; 4] = [
            &[1.0],
            &[5.0, 5.0, 5.0],
            &[0.1, 99.9, 42.0, 17.25],
            &[31.0, 7.0, 88.0, 0.0, 12.5],
        ];
        for values in samples {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let average = compute(&MovingAverage, values);
            assert!(
                (min..=max).contains(&average),
                "{average} not in [{min}, {max}]"
            );
            assert_eq!(compute(&Maximum, values), max);
        }
    }

    #[test]
    fn test_registry_default() {
        let registry = MetricRegistry::default();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["maximum", "moving_average"]
        );
        let metric = registry.build("moving_average").unwrap();
        assert_eq!(metric.name(), "moving_average");
        assert_eq!(metric.output_field(), "average_delivery_time");
        let metric = registry.build("maximum").unwrap();
        assert_eq!(metric.output_field(), "max_delivery_time");
    }

    #[test]
    fn test_registry_unsupported_metric() {
        let registry = MetricRegistry::default();
        let err = registry.build("median").unwrap_err();
        assert_eq!(
            err,
            AggregationError::UnsupportedMetric {
                name: "median".to_string(),
                supported: "maximum, moving_average".to_string(),
            }
        );
        assert_eq!(
            err.to_string(),
            "unsupported metric 'median', supported metrics: maximum, moving_average"
        );
    }

    #[derive(Debug)]
    struct Minimum;

    impl Metric for Minimum {
        fn name(&self) -> &'static str {
            "minimum"
        }
        fn output_field(&self) -> &'static str {
            "min_delivery_time"
        }
        fn compute(&self, values: &mut dyn Iterator<Item = f64>) -> f64 {
            values.reduce(f64::min).unwrap_or(0.0)
        }
    }

    #[test]
    fn test_registry_register_custom_metric() {
        let mut registry = MetricRegistry::default();
        assert!(!registry.contains("minimum"));
        registry.register(|| Box::new(Minimum));
        assert!(registry.contains("minimum"));
        let metric = registry.build("minimum").unwrap();
        assert_eq!(compute(metric.as_ref(), &[4.0, 2.0, 9.0]), 2.0);
        assert_eq!(compute(metric.as_ref(), &[]), 0.0);
    }
}

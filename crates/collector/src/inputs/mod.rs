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

//! Event input infrastructure for the collector.
//!
//! # Input Sources
//!
//! - [`files`] - JSON-lines event files, replayed and optionally followed
//!
//! Malformed input never leaves this module: it is reported as an
//! [`InputProcessingError`], logged, counted and skipped by the source.

pub mod files;

/// Categorized errors from input processing operations.
///
/// Provides structured error information suitable for logging, metrics,
/// and operational decisions. Each variant contains:
/// - `context`: Where the error occurred
/// - `reason`: Why it occurred
#[derive(Debug, Clone, strum_macros::Display)]
pub enum InputProcessingError {
    #[strum(to_string = "Invalid format in {context}: {reason}")]
    InvalidFormat { context: String, reason: String },

    #[strum(to_string = "UTF-8 decode error in {context}: {reason}")]
    Utf8Error { context: String, reason: String },

    #[strum(to_string = "JSON error in {context}: {reason}")]
    JsonError { context: String, reason: String },

    #[strum(to_string = "IO error in {context}: {reason}")]
    IoError {
        context: String,
        reason: String,
        kind: std::io::ErrorKind,
    },

    #[strum(to_string = "Event channel closed in {context}")]
    ChannelClosed { context: String },
}

impl std::error::Error for InputProcessingError {}

impl InputProcessingError {
    /// Returns a static category label for metrics classification.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidFormat { .. } => "invalid_format",
            Self::Utf8Error { .. } => "utf8_error",
            Self::JsonError { .. } => "json_error",
            Self::IoError { .. } => "io_error",
            Self::ChannelClosed { .. } => "channel_closed",
        }
    }

    /// Malformed lines are skipped, everything else interrupts the reading
    pub fn is_malformed_line(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat { .. } | Self::Utf8Error { .. } | Self::JsonError { .. }
        )
    }

    pub(crate) fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        Self::IoError {
            context: context.into(),
            reason: err.to_string(),
            kind: err.kind(),
        }
    }
}

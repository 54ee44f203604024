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

//! Publishers writing the per-minute results out of the collector.

use serde::{Deserialize, Serialize};
use std::{convert::Infallible, path::PathBuf, str::FromStr};

pub mod json_lines;

/// Token selecting the console output on the command line
pub const CONSOLE_OUTPUT: &str = "cli";

const DEFAULT_OUTPUT_FILE: &str = "output.json";

/// Destination of the per-minute results, one JSON object per line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputConfig {
    /// Standard output
    Console,

    /// File opened in append mode, created when missing
    File { path: PathBuf },
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::File {
            path: PathBuf::from(DEFAULT_OUTPUT_FILE),
        }
    }
}

impl FromStr for OutputConfig {
    type Err = Infallible;

    /// `cli` selects the console, anything else is a file path
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CONSOLE_OUTPUT {
            Ok(Self::Console)
        } else {
            Ok(Self::File {
                path: PathBuf::from(s),
            })
        }
    }
}

#[derive(Debug, strum_macros::Display)]
pub enum PublisherError {
    #[strum(to_string = "failed to open output '{path}': {reason}")]
    OpenError { path: String, reason: String },

    #[strum(to_string = "failed to write to output '{path}': {reason}")]
    WriteError { path: String, reason: String },

    #[strum(to_string = "failed to serialize result: {0}")]
    SerializationError(String),
}

impl std::error::Error for PublisherError {}

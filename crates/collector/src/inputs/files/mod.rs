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
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

mod actor;
mod handlers;
mod processor;

pub use actor::{FilesActorHandle, FilesActorHandleError, FilesActorStats};
pub use handlers::{FilesLineHandler, JsonEventsHandler};
pub use processor::{FileProcessor, LineBatch};

const fn default_poll_interval() -> Duration {
    Duration::from_millis(500)
}

const fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilesConfig {
    /// JSON-lines file with one event per line
    pub path: PathBuf,

    /// Keep following the file for new events once the existing ones are
    /// replayed
    #[serde(default)]
    pub follow: bool,

    /// Delay between two checks for new lines while following
    #[serde(default = "default_poll_interval")]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,

    /// Delay before reading again after the file went missing or unreadable
    /// while following
    #[serde(default = "default_retry_interval")]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub retry_interval: Duration,
}

impl FilesConfig {
    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }
    pub fn follow(&self) -> bool {
        self.follow
    }
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

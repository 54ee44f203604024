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

//! File processing module
//!
//! Incremental reading of an append-only line-oriented file: every call
//! continues from the byte offset where the previous one stopped, so each
//! line is handed to the line handler exactly once.
use crate::inputs::{files::handlers::FilesLineHandler, InputProcessingError};
use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncSeekExt, BufReader},
};
use tracing::warn;

/// Outcome of one [`FileProcessor::read_lines`] call
#[derive(Debug)]
pub struct LineBatch<T> {
    /// Number of lines consumed, blank and malformed ones included
    pub lines: usize,

    /// Result of the handler for every non-blank line, in file order
    pub items: Vec<Result<T, InputProcessingError>>,
}

/// `FileProcessor` remembers how far a file has been consumed.
///
/// # Features
/// - Resumes from the last consumed byte offset on every call
/// - Restarts from the beginning when the file shrinks below that offset
/// - Optionally leaves an unterminated last line for a later call, for files
///   that are still being written to
/// - Blank lines are consumed but never handed to the line handler
#[derive(Debug)]
pub struct FileProcessor {
    path: PathBuf,
    position: u64,
    require_newline: bool,
}

impl FileProcessor {
    /// When `require_newline` is set, a last line without a trailing newline
    /// is considered partially written and is not consumed.
    pub fn new(path: impl Into<PathBuf>, require_newline: bool) -> Self {
        Self {
            path: path.into(),
            position: 0,
            require_newline,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the first line not consumed yet
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads at most `max_lines` lines following the last consumed one and
    /// runs the handler on each of them.
    ///
    /// I/O errors are returned without consuming anything, the same lines
    /// are read again on the next call.
    pub async fn read_lines<T, H>(
        &mut self,
        handler: &mut H,
        max_lines: usize,
    ) -> Result<LineBatch<T>, InputProcessingError>
    where
        H: FilesLineHandler<T> + ?Sized,
    {
        let context = || format!("reading file '{}'", self.path.display());
        let mut file = fs::File::open(&self.path)
            .await
            .map_err(|e| InputProcessingError::io(context(), e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| InputProcessingError::io(context(), e))?
            .len();
        if len < self.position {
            warn!(
                "File {:?} shrank from {} to {} bytes, reading it again from the start",
                self.path, self.position, len
            );
            self.position = 0;
        }
        file.seek(SeekFrom::Start(self.position))
            .await
            .map_err(|e| InputProcessingError::io(context(), e))?;

        let mut reader = BufReader::new(file);
        let mut batch = LineBatch {
            lines: 0,
            items: Vec::new(),
        };
        let mut position = self.position;
        let mut buf = Vec::new();
        while batch.lines < max_lines {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| InputProcessingError::io(context(), e))?;
            if read == 0 || (self.require_newline && buf.last() != Some(&b'\n')) {
                break;
            }
            let line_start = position;
            position += read as u64;
            batch.lines += 1;
            match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        batch.items.push(handler.handle_line(line, &self.path));
                    }
                }
                Err(e) => batch.items.push(Err(InputProcessingError::Utf8Error {
                    context: format!("file '{}' at byte {}", self.path.display(), line_start),
                    reason: e.to_string(),
                })),
            }
        }
        self.position = position;
        Ok(batch)
    }
}

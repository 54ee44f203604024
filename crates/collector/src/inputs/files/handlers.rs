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
use crate::inputs::InputProcessingError;
use minutely_analytics::event::Event;
use std::path::Path;

/// **Generic Files Line Handler Trait**
///
/// Trait for handling files with different formats
pub trait FilesLineHandler<T>: Send + Sync + 'static {
    /// Parse a raw, trimmed, non-empty line into the output type `T`
    fn handle_line(&mut self, line: &str, path: &Path) -> Result<T, InputProcessingError>;
}

/// **JSON Events Handler**
///
/// Handler for json-line input files with one [`Event`] per line, such as:
///
/// ```jsonl
/// {"timestamp": "2018-12-26 18:11:08.509654","translation_id": "5aa5b2f39f7254a75aa5","source_language": "en","target_language": "fr","client_name": "airliberty","event_name": "translation_delivered","nr_words": 30, "duration": 20}
/// {"timestamp": "2018-12-26 18:15:19.903159","translation_id": "5aa5b2f39f7254a75aa4","source_language": "en","target_language": "fr","client_name": "airliberty","event_name": "translation_delivered","nr_words": 30, "duration": 31}
/// ```
///
/// Every field is required and the duration must not be negative.
#[derive(Debug, Clone, Default)]
pub struct JsonEventsHandler;

impl JsonEventsHandler {
    pub fn new() -> Self {
        Self
    }
}

impl FilesLineHandler<Event> for JsonEventsHandler {
    fn handle_line(&mut self, line: &str, path: &Path) -> Result<Event, InputProcessingError> {
        let event: Event =
            serde_json::from_str(line).map_err(|e| InputProcessingError::JsonError {
                context: format!("JsonEventsHandler (file '{}', line '{line}')", path.display()),
                reason: e.to_string(),
            })?;
        event
            .validate()
            .map_err(|e| InputProcessingError::InvalidFormat {
                context: format!("JsonEventsHandler (file '{}', line '{line}')", path.display()),
                reason: e.to_string(),
            })?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const PATH: &str = "/tmp/events.json";

    #[test]
    fn test_handle_valid_line() {
        let line = r#"{"timestamp": "2018-12-26 18:11:08.509654","translation_id": "5aa5b2f39f7254a75aa5","source_language": "en","target_language": "fr","client_name": "airliberty","event_name": "translation_delivered","nr_words": 30, "duration": 20}"#;
        let event = JsonEventsHandler::new()
            .handle_line(line, Path::new(PATH))
            .unwrap();
        assert_eq!(
            event.timestamp,
            Utc.with_ymd_and_hms(2018, 12, 26, 18, 11, 8).unwrap()
                + chrono::TimeDelta::microseconds(509654)
        );
        assert_eq!(event.client_name, "airliberty");
        assert_eq!(event.nr_words, 30);
        assert_eq!(event.duration, 20.0);
    }

    #[test]
    fn test_handle_invalid_json() {
        let err = JsonEventsHandler::new()
            .handle_line("{not valid json}", Path::new(PATH))
            .unwrap_err();
        assert!(matches!(err, InputProcessingError::JsonError { .. }));
        assert_eq!(err.category(), "json_error");
        assert!(err.is_malformed_line());
    }

    #[test]
    fn test_handle_missing_key() {
        let line = r#"{"timestamp": "2018-12-26 18:11:08.509654","source_language": "en","target_language": "fr","client_name": "airliberty","event_name": "translation_delivered","nr_words": 30, "duration": 20}"#;
        let err = JsonEventsHandler::new()
            .handle_line(line, Path::new(PATH))
            .unwrap_err();
        assert!(matches!(err, InputProcessingError::JsonError { .. }));
        assert!(err.to_string().contains("translation_id"));
    }

    #[test]
    fn test_handle_negative_duration() {
        let line = r#"{"timestamp": "2018-12-26 18:11:08","translation_id": "x","source_language": "en","target_language": "fr","client_name": "c","event_name": "translation_delivered","nr_words": 1, "duration": -3}"#;
        let err = JsonEventsHandler::new()
            .handle_line(line, Path::new(PATH))
            .unwrap_err();
        assert!(matches!(err, InputProcessingError::InvalidFormat { .. }));
        assert_eq!(err.category(), "invalid_format");
    }

    #[test]
    fn test_handle_timestamp_out_of_range() {
        let line = r#"{"timestamp": "+262142-12-31 23:59:30","translation_id": "x","source_language": "en","target_language": "fr","client_name": "c","event_name": "translation_delivered","nr_words": 1, "duration": 5}"#;
        let err = JsonEventsHandler::new()
            .handle_line(line, Path::new(PATH))
            .unwrap_err();
        assert!(matches!(err, InputProcessingError::InvalidFormat { .. }));
        assert!(err.is_malformed_line());
    }
}

// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    /// capability errors
    #[error("record reader does not support reset")]
    NoReset,

    /// format errors
    #[error("malformed control record: {0}")]
    MalformedControlRecord(String),

    #[error("corrupt message: {0}")]
    CorruptMessage(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("message too large: {0}")]
    MessageTooLarge(String),
}

impl AppError {
    /// True when a reset was requested on a reader that cannot replay.
    /// Callers use this to tell "retry impossible" apart from a failed rewind.
    pub fn is_no_reset(&self) -> bool {
        matches!(self, AppError::NoReset)
    }

    /// Format errors are fatal for the record or batch they came from,
    /// retrying the same bytes cannot succeed.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            AppError::MalformedControlRecord(_)
                | AppError::CorruptMessage(_)
                | AppError::UnsupportedFormat(_)
                | AppError::MessageTooLarge(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert!(AppError::NoReset.is_no_reset());
        assert!(!AppError::NoReset.is_format_error());

        let err = AppError::MalformedControlRecord("key of size 3".to_string());
        assert!(err.is_format_error());
        assert!(!err.is_no_reset());

        let io: AppError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(!io.is_format_error());
        assert!(!io.is_no_reset());
    }
}

// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Outcome kinds surfaced by the result buffer layer.
//!
//! None of these are fatal to the process: a fetch against a missing or
//! cancelled query is an ordinary, reportable outcome.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultErrorKind {
    /// The query id is unknown, or its buffer was already torn down.
    NotFound,
    /// The buffer was cancelled explicitly, by deadline, or by owner teardown.
    Cancelled,
    /// The producer recorded a failure; replayed to every later fetch.
    Failed,
    /// A local wait bound elapsed. Does not cancel the buffer.
    Timeout,
    InvalidArgument,
    NotInitialized,
}

impl ResultErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultErrorKind::NotFound => "NOT_FOUND",
            ResultErrorKind::Cancelled => "CANCELLED",
            ResultErrorKind::Failed => "INTERNAL_ERROR",
            ResultErrorKind::Timeout => "TIMEOUT",
            ResultErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ResultErrorKind::NotInitialized => "NOT_INITIALIZED",
        }
    }
}

impl fmt::Display for ResultErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultError {
    pub kind: ResultErrorKind,
    pub message: String,
}

impl ResultError {
    pub fn new(kind: ResultErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::NotFound, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::Cancelled, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::Failed, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::Timeout, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::InvalidArgument, message)
    }

    pub fn not_initialized(message: impl Into<String>) -> Self {
        Self::new(ResultErrorKind::NotInitialized, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ResultErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ResultErrorKind::Cancelled
    }
}

impl fmt::Display for ResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ResultError {}

pub type ResultStatus<T> = Result<T, ResultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = ResultError::cancelled("Cancelled");
        assert_eq!(err.to_string(), "CANCELLED: Cancelled");
        assert!(err.is_cancelled());
        assert!(!err.is_not_found());
    }

    #[test]
    fn anyhow_accepts_result_error() {
        let err: anyhow::Error = ResultError::not_found("no result for this query").into();
        assert!(err.to_string().contains("NOT_FOUND"));
    }
}

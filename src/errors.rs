// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! Errors that abort a pointer analysis run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PtaError {
    /// An invoke statement whose target cannot be resolved while strict
    /// resolution checking is enabled.
    #[error("unresolved call target `{class}: {sub_signature}` at {method}#{stmt}")]
    UnresolvedCall {
        method: String,
        stmt: usize,
        class: String,
        sub_signature: String,
    },

    /// An edge whose endpoints do not form a simple, load, store or allocation constraint.
    #[error("malformed PAG edge {src} -> {dst}")]
    MalformedEdge { src: String, dst: String },

    #[error("malformed program: {0}")]
    MalformedProgram(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PtaError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        PtaError::MalformedProgram(msg.into())
    }
}

pub type PtaResult<T> = std::result::Result<T, PtaError>;

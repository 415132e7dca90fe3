//! # 에러 분류
//!
//! 전제조건 위반, 캐시 불일치, 수치 불안정, 디바이스 오류를 하나의 열거형으로 모은다.
//! 감지된 이상은 모두 치명적이며 재시도하지 않는다.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HmcError {
    #[error("hierarchy matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("hierarchy contains a cycle through node {node}")]
    Cycle { node: usize },

    #[error("hierarchy has no nodes")]
    EmptyHierarchy,

    #[error("label row {row} asserts node {node} without its ancestor {ancestor}")]
    InconsistentLabels {
        row: usize,
        node: usize,
        ancestor: usize,
    },

    #[error("label row {row} has zero probability under the circuit (rejected at variable {var})")]
    ZeroProbability { row: usize, var: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("compiled circuit at {path:?} does not match the current hierarchy: {reason}")]
    CacheMismatch { path: PathBuf, reason: String },

    #[error("compiled circuit at {path:?} is corrupted: {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    #[error("circuit parameters were not set before querying")]
    ParamsNotSet,

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid npy file {path:?}: {reason}")]
    Npy { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, HmcError>;

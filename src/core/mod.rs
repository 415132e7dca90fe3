//! # 계층 제약 핵심 모듈
//!
//! 계층 행렬 → 조상 행렬 → {제약 투영 | 회로 컴파일 + 파라미터화 질의}

pub mod circuit;
pub mod error;
pub mod hierarchy;
pub mod projection;

pub use circuit::{compile, Circuit, CircuitMpe, CircuitStore};
pub use error::{HmcError, Result};
pub use hierarchy::{load_adjacency, Adjacency, AncestorMatrix, Orientation, Taxonomy};
pub use projection::{project, project_rows, ConstraintProjection};

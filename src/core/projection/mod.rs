//! # 제약 투영 레이어
//!
//! 각 레이블 점수를 자신과 모든 조상 점수의 최댓값으로 바꾼다.

pub mod constraint_projection;


pub use constraint_projection::{project, project_rows, ConstraintProjection};

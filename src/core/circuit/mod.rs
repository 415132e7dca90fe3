//! # 회로 제약 엔진
//!
//! 계층을 논리 회로로 컴파일하고(`manager`), 디스크에 캐시하며(`storage`),
//! 예제별 파라미터로 정확한 제약 가능도와 MPE를 계산한다(`mpe`).

pub mod compiled;
pub mod manager;
pub mod mpe;
pub mod storage;

#[cfg(test)]
mod __tests__;

pub use compiled::{Child, Circuit, CircuitParts, DecisionNode};
pub use manager::{compile, topological_order, Manager, NodeId};
pub use mpe::{log_sigmoid, CircuitMpe};
pub use storage::{CircuitStore, FORMAT_VERSION};

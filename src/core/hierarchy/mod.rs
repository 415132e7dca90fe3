//! # 레이블 계층
//!
//! 인접 행렬 A → 조상 행렬 R. 투영 레이어와 회로 컴파일러가 같은 R을 공유한다.

pub mod builder;
pub mod closure;
pub mod npy;

// 테스트 모듈
#[cfg(test)]
mod __tests__;

pub use builder::{load_adjacency, Orientation, Taxonomy};
pub use closure::{Adjacency, AncestorMatrix};
pub use npy::{read_npy, write_npy, NpyArray, NpyDtype};

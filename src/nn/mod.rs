//! # 신경망 구성 요소
//!
//! 백본(임베딩) → 게이트(회로 파라미터). 두 모듈은 같은 `VarMap` 아래에서 함께 학습된다.

pub mod backbone;
pub mod gate;
pub mod init;

#[cfg(test)]
mod __tests__;

pub use backbone::{Backbone, BackboneConfig, Modality, NonLinearity};
pub use gate::DenseGate;
pub use init::reinitialize;

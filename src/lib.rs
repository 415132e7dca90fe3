//! HMC (Hierarchical Multi-label Classification) 회로 라이브러리
//!
//! 레이블 계층(DAG)을 지키는 다중 레이블 분류. 평가 시 max 기반 제약 투영과
//! 계층 일관 할당만 표현하는 확률 회로 손실/MPE 예측을 제공한다.

pub mod core;
pub mod nn;
pub mod training;

// 핵심 타입 재수출
pub use crate::core::{
    compile, Adjacency, AncestorMatrix, Circuit, CircuitMpe, CircuitStore, ConstraintProjection, HmcError,
    Orientation, Result,
};
pub use nn::{Backbone, BackboneConfig, DenseGate, Modality, NonLinearity};
pub use training::{DatasetSource, EpochSummary, HmcDataset, RunConfig, Trainer};

//! # 학습 파이프라인
//!
//! 실행 설정, 데이터셋 카탈로그와 로더, 평가 지표, 실행 산출물, 학습 루프.

pub mod catalog;
pub mod config;
pub mod data;
pub mod metrics;
pub mod run_log;
pub mod trainer;

#[cfg(test)]
mod __tests__;

pub use catalog::{DatasetInfo, Ontology};
pub use config::{select_device, RunConfig};
pub use data::{holdout, DatasetSource, HmcDataset, NpyDirectory, Split, Standardizer, Synthetic};
pub use metrics::{
    exact_accuracy, hamming_loss, micro_average_precision, micro_jaccard, EvalMetrics, ProjectedMetrics,
};
pub use run_log::{read_scalars, RunLog, ScalarRecord};
pub use trainer::{dataset_source, run, EpochSummary, Trainer, HOLDOUT_FRACTION};

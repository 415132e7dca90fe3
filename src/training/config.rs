//! # 실행 설정
//!
//! 전역 상태 대신 명시적으로 구성 요소에 전달되는 설정. `args.json`으로 그대로 덤프된다.

use std::path::PathBuf;

use candle_core::Device;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::Orientation;
use crate::nn::NonLinearity;

/// 학습 실행 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// `<data>_<ontology>` 형식의 데이터셋 이름
    pub dataset: String,
    /// `.npy` 데이터 디렉터리 (없으면 합성 데이터)
    pub data_dir: Option<PathBuf>,
    /// 합성 데이터 레이블 수
    pub synthetic: Option<usize>,
    pub seed: u64,
    /// `cpu`, `cuda`, `cuda:N` 또는 GPU 번호
    pub device: String,
    pub emb_size: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub wd: f64,
    pub n_epochs: usize,
    /// 출력 루트 디렉터리
    pub output: PathBuf,
    pub exp_id: Option<String>,
    /// 완전 분해 분포 사용 (제약 없음)
    pub no_constraints: bool,
    /// 게이트 은닉층 수
    pub gates: usize,
    /// 게이트 은닉층 폭
    pub gate_hidden: usize,
    /// 과매개변수화 정도
    #[serde(rename = "S")]
    pub s: usize,
    /// 앙상블 복사본 수
    pub num_reps: usize,
    /// 회로 캐시 디렉터리
    pub constraints_dir: PathBuf,
    /// K 에포크마다 평가
    pub eval_every: usize,
    /// 카탈로그 값을 덮어쓰는 은닉층 폭
    pub hidden_dim: Option<usize>,
    pub num_layers: usize,
    pub dropout: f32,
    pub non_lin: NonLinearity,
    pub orientation: Orientation,
    pub quiet: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            data_dir: None,
            synthetic: None,
            seed: 1337,
            device: "cpu".into(),
            emb_size: 128,
            batch_size: 100,
            lr: 1e-4,
            wd: 1e-5,
            n_epochs: 200,
            output: PathBuf::from("exp"),
            exp_id: None,
            no_constraints: false,
            gates: 1,
            gate_hidden: 256,
            s: 0,
            num_reps: 1,
            constraints_dir: PathBuf::from("constraints"),
            eval_every: 5,
            hidden_dim: None,
            num_layers: 3,
            dropout: 0.7,
            non_lin: NonLinearity::Relu,
            orientation: Orientation::ParentToChild,
            quiet: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch-size", self.batch_size),
            ("emb-size", self.emb_size),
            ("num-reps", self.num_reps),
            ("eval-every", self.eval_every),
            ("num-layers", self.num_layers),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HmcError::Config(format!("--{} must be positive", name)));
            }
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(HmcError::Config(format!("--lr must be positive, got {}", self.lr)));
        }
        if self.wd < 0.0 {
            return Err(HmcError::Config(format!("--wd must be non-negative, got {}", self.wd)));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(HmcError::Config(format!("--dropout must be in [0, 1), got {}", self.dropout)));
        }
        if self.data_dir.is_some() && self.synthetic.is_some() {
            return Err(HmcError::Config("--data-dir and --synthetic are exclusive".into()));
        }
        Ok(())
    }

    /// `<output>/<exp-id>` 또는 `<output>/<dataset>_<YYYYmmdd-HHMMSS>_<batch>_<gates>_<lr>`
    pub fn output_dir(&self, now: DateTime<Local>) -> PathBuf {
        match &self.exp_id {
            Some(id) => self.output.join(id),
            None => self.output.join(format!(
                "{}_{}_{}_{}_{}",
                self.dataset,
                now.format("%Y%m%d-%H%M%S"),
                self.batch_size,
                self.gates,
                self.lr
            )),
        }
    }

    pub fn select_device(&self) -> Result<Device> {
        select_device(&self.device)
    }
}

/// `cpu` | `cuda` | `cuda:N` | `N`
pub fn select_device(name: &str) -> Result<Device> {
    let ordinal = match name.trim() {
        "cpu" => return Ok(Device::Cpu),
        "cuda" => 0,
        other => other
            .strip_prefix("cuda:")
            .unwrap_or(other)
            .parse::<usize>()
            .map_err(|_| HmcError::Device(format!("unrecognised device '{}'", name)))?,
    };
    Device::new_cuda(ordinal).map_err(|e| HmcError::Device(format!("cuda:{}: {}", ordinal, e)))
}

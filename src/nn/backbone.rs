//! # 분류기 백본
//!
//! 표 형식 입력은 완전연결 스택, 이미지 입력은 합성곱 트렁크 + 완전연결 스택.
//! 임베딩은 게이트로, 레이블 점수 헤드(`emb → N`)는 투영 점수 질의로 간다.
//! 학습과 평가는 투영 적용 여부만 다르다.

use candle_core::{Module, Tensor};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Dropout, Linear, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::core::circuit::log_sigmoid;
use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::AncestorMatrix;
use crate::core::projection::ConstraintProjection;

/// 입력 종류 (데이터셋 카탈로그가 한 번 결정)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Tabular,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NonLinearity {
    Relu,
    Tanh,
}

impl NonLinearity {
    fn apply(self, x: &Tensor) -> Result<Tensor> {
        Ok(match self {
            NonLinearity::Relu => x.relu()?,
            NonLinearity::Tanh => x.tanh()?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneConfig {
    pub modality: Modality,
    /// 표 형식 입력의 특성 수 (이미지는 무시)
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub emb_size: usize,
    /// 레이블 점수 헤드 폭 (레이블 수)
    pub num_labels: usize,
    pub num_layers: usize,
    pub dropout: f32,
    pub non_lin: NonLinearity,
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            modality: Modality::Tabular,
            input_dim: 0,
            hidden_dim: 500,
            emb_size: 128,
            num_labels: 0,
            num_layers: 3,
            dropout: 0.7,
            non_lin: NonLinearity::Relu,
        }
    }
}

/// 이미지 트렁크 출력 해상도
const POOLED: usize = 7;
const TRUNK_CHANNELS: [usize; 4] = [3, 32, 64, 128];

/// conv(3×3) + 활성화 + maxpool(2) 세 단계, 이후 7×7 적응 평균 풀링
#[derive(Debug, Clone)]
struct ConvTrunk {
    convs: Vec<Conv2d>,
}

impl ConvTrunk {
    fn new(vb: VarBuilder) -> Result<Self> {
        let convs = TRUNK_CHANNELS
            .windows(2)
            .enumerate()
            .map(|(i, w)| conv2d(w[0], w[1], 3, Conv2dConfig::default(), vb.pp(format!("conv{}", i + 1))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { convs })
    }

    fn out_features(&self) -> usize {
        TRUNK_CHANNELS[TRUNK_CHANNELS.len() - 1] * POOLED * POOLED
    }

    fn forward(&self, x: &Tensor, non_lin: NonLinearity) -> Result<Tensor> {
        let mut x = x.clone();
        for conv in &self.convs {
            x = non_lin.apply(&conv.forward(&x)?)?.max_pool2d(2)?;
        }
        Ok(adaptive_avg_pool2d(&x, POOLED)?.flatten_from(1)?)
    }
}

/// 칸 `i`는 `[⌊iH/k⌋, ⌈(i+1)H/k⌉)` 구간의 평균
fn adaptive_avg_pool2d(x: &Tensor, k: usize) -> Result<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let bounds = |i: usize, size: usize| (i * size / k, ((i + 1) * size + k - 1) / k);

    let mut rows = Vec::with_capacity(k);
    for i in 0..k {
        let (h0, h1) = bounds(i, h);
        let band = x.narrow(2, h0, h1 - h0)?.mean_keepdim(2)?;
        let mut cells = Vec::with_capacity(k);
        for j in 0..k {
            let (w0, w1) = bounds(j, w);
            cells.push(band.narrow(3, w0, w1 - w0)?.mean_keepdim(3)?);
        }
        rows.push(Tensor::cat(&cells, 3)?);
    }
    Ok(Tensor::cat(&rows, 2)?)
}

/// 임베딩을 만드는 특성 추출기
#[derive(Debug, Clone)]
pub struct Backbone {
    trunk: Option<ConvTrunk>,
    layers: Vec<Linear>,
    head: Linear,
    dropout: Dropout,
    non_lin: NonLinearity,
    emb_size: usize,
    num_labels: usize,
    projection: Option<ConstraintProjection>,
}

impl Backbone {
    /// `ancestors`가 주어지면 평가 시 `score_*` 결과에 제약 투영을 적용한다
    pub fn new(config: &BackboneConfig, ancestors: Option<&AncestorMatrix>, vb: VarBuilder) -> Result<Self> {
        if config.num_layers == 0 {
            return Err(HmcError::Config("backbone needs at least one layer".into()));
        }
        if !(0.0..1.0).contains(&config.dropout) {
            return Err(HmcError::Config(format!("dropout {} is outside [0, 1)", config.dropout)));
        }
        if config.num_labels == 0 {
            return Err(HmcError::Config("backbone needs at least one label".into()));
        }

        let trunk = match config.modality {
            Modality::Image => Some(ConvTrunk::new(vb.clone())?),
            Modality::Tabular => None,
        };
        let input = trunk.as_ref().map_or(config.input_dim, ConvTrunk::out_features);

        let last = config.num_layers - 1;
        let layers = (0..config.num_layers)
            .map(|i| {
                let fan_in = if i == 0 { input } else { config.hidden_dim };
                let fan_out = if i == last { config.emb_size } else { config.hidden_dim };
                linear(fan_in, fan_out, vb.pp(format!("fc{}", i)))
            })
            .collect::<candle_core::Result<Vec<_>>>()?;
        let head = linear(config.emb_size, config.num_labels, vb.pp("head"))?;

        let projection = ancestors
            .map(|r| ConstraintProjection::new(r, vb.device()))
            .transpose()?;
        if let Some(projection) = &projection {
            if projection.num_labels() != config.num_labels {
                return Err(HmcError::ShapeMismatch(format!(
                    "hierarchy has {} labels, score head has {}",
                    projection.num_labels(),
                    config.num_labels
                )));
            }
        }

        Ok(Self {
            trunk,
            layers,
            head,
            dropout: Dropout::new(config.dropout),
            non_lin: config.non_lin,
            emb_size: config.emb_size,
            num_labels: config.num_labels,
            projection,
        })
    }

    pub fn emb_size(&self) -> usize {
        self.emb_size
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// 마지막 층의 원시 출력 (B, emb)
    pub fn embed(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let mut x = match &self.trunk {
            Some(trunk) => trunk.forward(x, self.non_lin)?,
            None => x.clone(),
        };
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = self.non_lin.apply(&x)?;
                x = self.dropout.forward(&x, train)?;
            }
        }
        Ok(x)
    }

    fn constrain(&self, scores: Tensor, train: bool) -> Result<Tensor> {
        match (&self.projection, train) {
            (Some(projection), false) => projection.forward(&scores),
            _ => Ok(scores),
        }
    }

    /// 레이블 로짓 (B, num_labels)
    pub fn label_logits(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        Ok(self.head.forward(&self.embed(x, train)?)?)
    }

    /// 시그모이드 점수 (B, num_labels). 평가 모드면 투영.
    pub fn score_with_sigmoid(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let scores = candle_nn::ops::sigmoid(&self.label_logits(x, train)?)?;
        self.constrain(scores, train)
    }

    /// 로그 시그모이드 점수 (B, num_labels). 평가 모드면 투영.
    pub fn score_with_log_sigmoid(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let scores = log_sigmoid(&self.label_logits(x, train)?)?;
        self.constrain(scores, train)
    }
}

//! # 학습/평가 루프
//!
//! 백본 → 게이트 → 회로 교차 엔트로피. K 에포크마다 회로 MPE로 평가한다.

use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::catalog::DatasetInfo;
use super::config::RunConfig;
use super::data::{holdout, DatasetSource, HmcDataset, NpyDirectory, Split, Standardizer, Synthetic};
use super::metrics::{micro_average_precision, micro_jaccard, EvalMetrics, ProjectedMetrics};
use super::run_log::RunLog;
use crate::core::circuit::{compile, CircuitMpe, CircuitStore};
use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::AncestorMatrix;
use crate::nn::{reinitialize, Backbone, BackboneConfig, DenseGate, Modality};

/// 검증 분할이 없을 때 떼어내는 비율
pub const HOLDOUT_FRACTION: f64 = 0.3;
const DEFAULT_HIDDEN_DIM: usize = 500;
const TEST_PREFIX: &str = "param_sdd/test";
const VALID_PREFIX: &str = "param_sdd/valid";

/// 에포크 하나의 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    /// 배치 평균 손실 (최종 평가 행은 `None`)
    pub train_loss: Option<f64>,
    pub test: Option<EvalMetrics>,
    pub valid: Option<EvalMetrics>,
    pub seconds: f64,
}

pub struct Trainer {
    config: RunConfig,
    device: Device,
    data: HmcDataset,
    ancestors: AncestorMatrix,
    varmap: VarMap,
    backbone: Backbone,
    gate: DenseGate,
    mpe: CircuitMpe,
    optimizer: AdamW,
    rng: StdRng,
}

impl Trainer {
    /// 데이터 준비(검증 분할, 표준화, 일관성 검사), 회로 로드, 모델 구성까지
    pub fn new(config: RunConfig, dataset: HmcDataset, device: Device) -> Result<Self> {
        config.validate()?;
        let info = DatasetInfo::resolve(&config.dataset)?;
        let data = prepare(dataset, info.modality, config.seed)?;

        let n = data.num_labels();
        let ancestors = match &data.adjacency {
            Some(adjacency) => AncestorMatrix::from_adjacency(adjacency)?,
            None => {
                log::warn!("⚠️ 계층 파일이 없어 제약 없는 계층을 사용합니다");
                AncestorMatrix::identity(n)?
            }
        };
        if ancestors.len() != n {
            return Err(HmcError::ShapeMismatch(format!(
                "hierarchy has {} nodes, labels have {} columns",
                ancestors.len(),
                n
            )));
        }
        data.check_labels(&ancestors)?;
        if let Some(expected) = info.output_dim.filter(|&d| d != n) {
            log::warn!("⚠️ {}: 카탈로그 출력 차원 {}과 레이블 수 {}가 다릅니다", info.name, expected, n);
        }

        let circuit = if config.no_constraints {
            compile(&AncestorMatrix::identity(n)?)?
        } else {
            CircuitStore::new(&config.constraints_dir).load_or_compile(&config.dataset, &ancestors)?
        };
        let mut mpe = CircuitMpe::new(circuit, config.num_reps)?;
        mpe.overparameterize(config.s);
        log::info!(
            "⚡ 회로: 노드 {}개, 자유 노드 {}개, 게이트 출력 {}",
            mpe.circuit().node_count(),
            mpe.circuit().num_free(),
            mpe.param_count()
        );

        let backbone_config = BackboneConfig {
            modality: info.modality,
            input_dim: feature_width(&data.train, info.modality)?,
            hidden_dim: config.hidden_dim.or(info.hidden_dim).unwrap_or(DEFAULT_HIDDEN_DIM),
            emb_size: config.emb_size,
            num_labels: n,
            num_layers: config.num_layers,
            dropout: config.dropout,
            non_lin: config.non_lin,
        };
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let projection = (!config.no_constraints).then_some(&ancestors);
        let backbone = Backbone::new(&backbone_config, projection, vb.pp("backbone"))?;
        let gate = DenseGate::new(
            backbone.emb_size(),
            config.gate_hidden,
            config.gates,
            mpe.param_count(),
            vb.pp("gate"),
        )?;
        reinitialize(&varmap, config.seed)?;

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: config.lr,
                weight_decay: config.wd,
                ..Default::default()
            },
        )?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            device,
            data,
            ancestors,
            varmap,
            backbone,
            gate,
            mpe,
            optimizer,
            rng,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn data(&self) -> &HmcDataset {
        &self.data
    }

    pub fn ancestors(&self) -> &AncestorMatrix {
        &self.ancestors
    }

    pub fn circuit_mpe(&self) -> &CircuitMpe {
        &self.mpe
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn thetas(&self, split: &Split, indices: &[usize], train: bool) -> Result<Tensor> {
        let x = split.features(indices, &self.device)?;
        let emb = self.backbone.embed(&x, train)?;
        self.gate.forward(&emb)
    }

    /// 배치마다 옵티마이저 한 스텝. 배치 평균 손실을 돌려준다.
    pub fn train_epoch(&mut self, progress: &ProgressBar) -> Result<f64> {
        let mut indices: Vec<usize> = (0..self.data.train.len()).collect();
        indices.shuffle(&mut self.rng);

        let mut total = 0f64;
        let mut batches = 0usize;
        for chunk in indices.chunks(self.config.batch_size) {
            let thetas = self.thetas(&self.data.train, chunk, true)?;
            self.mpe.set_params(&thetas)?;
            let labels = self.data.train.labels(chunk);
            let loss = self.mpe.cross_entropy(&labels, true)?.mean_all()?;

            let value = f64::from(loss.to_scalar::<f32>()?);
            if !value.is_finite() {
                return Err(HmcError::NumericalInstability(format!(
                    "loss became {} at batch {}",
                    value, batches
                )));
            }
            self.optimizer.backward_step(&loss)?;
            total += value;
            batches += 1;
            progress.inc(chunk.len() as u64);
        }
        Ok(if batches == 0 { 0.0 } else { total / batches as f64 })
    }

    /// 회로 MPE 예측으로 평가 (마스크 열만)
    pub fn evaluate(&self, split: &Split) -> Result<EvalMetrics> {
        let mut mpe = self.mpe.clone();
        let mut predictions = Array2::from_elem((split.len(), split.num_labels()), false);
        let mut nll = 0f64;

        let indices: Vec<usize> = (0..split.len()).collect();
        for chunk in indices.chunks(self.config.batch_size) {
            let thetas = self.thetas(split, chunk, false)?.detach();
            mpe.set_params(&thetas)?;
            let labels = split.labels(chunk);
            nll -= mpe.log_likelihood(&labels)?.iter().map(|&ll| f64::from(ll)).sum::<f64>();

            let batch = mpe.get_mpe_inst(chunk.len())?;
            predictions
                .slice_mut(s![chunk[0]..chunk[0] + chunk.len(), ..])
                .assign(&batch);
        }
        let nll = if split.is_empty() { 0.0 } else { nll / split.len() as f64 };
        EvalMetrics::compute(&predictions, &split.y, self.data.to_eval.view(), nll)
    }

    /// 투영된 시그모이드 점수를 0.5에서 자른 예측으로 평가
    pub fn evaluate_projected(&self, split: &Split) -> Result<ProjectedMetrics> {
        let width = split.num_labels();
        let mut scores = Array2::<f32>::zeros((split.len(), width));
        let indices: Vec<usize> = (0..split.len()).collect();
        for chunk in indices.chunks(self.config.batch_size) {
            let x = split.features(chunk, &self.device)?;
            let batch = self.backbone.score_with_sigmoid(&x, false)?.detach();
            if batch.dims() != [chunk.len(), width] {
                return Err(HmcError::ShapeMismatch(format!(
                    "scores have shape {:?}, split has {} labels",
                    batch.dims(),
                    width
                )));
            }
            let values = batch.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
            let block = Array2::from_shape_vec((chunk.len(), width), values)
                .map_err(|e| HmcError::ShapeMismatch(e.to_string()))?;
            scores
                .slice_mut(s![chunk[0]..chunk[0] + chunk.len(), ..])
                .assign(&block);
        }

        let predicted = scores.mapv(|v| v > 0.5);
        let mask = self.data.to_eval.view();
        let num_correct = predicted
            .outer_iter()
            .zip(split.y.outer_iter())
            .filter(|(p, t)| p == t)
            .count();
        Ok(ProjectedMetrics {
            jaccard: micro_jaccard(predicted.view(), split.y.view(), mask)?,
            average_precision: micro_average_precision(scores.view(), split.y.view(), mask)?,
            num_correct,
        })
    }

    fn evaluate_both(&self, epoch: usize, log: Option<&mut RunLog>) -> Result<(EvalMetrics, EvalMetrics)> {
        let Some(valid_split) = self.data.valid.as_ref() else {
            return Err(HmcError::Config("validation split was not prepared".into()));
        };
        let started = Instant::now();
        let test = self.evaluate(&self.data.test)?;
        let test_seconds = started.elapsed().as_secs_f64();
        let started = Instant::now();
        let valid = self.evaluate(valid_split)?;
        let valid_seconds = started.elapsed().as_secs_f64();

        for (name, metrics, seconds) in [("test", &test, test_seconds), ("valid", &valid, valid_seconds)] {
            log::info!(
                "📊 EVAL@{} {}: acc {:.4}, hamming {:.4}, jaccard {:.4}, nll {:.4} ({:.4}s)",
                epoch,
                name,
                metrics.accuracy,
                metrics.hamming,
                metrics.jaccard,
                metrics.nll,
                seconds
            );
        }
        if let Some(log) = log {
            log.add_scalars(&test.scalars(TEST_PREFIX), epoch, test_seconds)?;
            log.add_scalars(&valid.scalars(VALID_PREFIX), epoch, valid_seconds)?;
        }
        Ok((test, valid))
    }

    /// 설정된 에포크 수만큼 학습. 평가는 `epoch % K == 0 && epoch != 0`일 때와 마지막에.
    pub fn fit(&mut self, mut log: Option<&mut RunLog>) -> Result<Vec<EpochSummary>> {
        let n_epochs = self.config.n_epochs;
        let progress = if self.config.quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new((n_epochs * self.data.train.len()) as u64);
            if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40}] {percent}% 에포크 {msg} ({eta})") {
                bar.set_style(style);
            }
            bar
        };

        let mut summaries = Vec::with_capacity(n_epochs + 1);
        for epoch in 0..n_epochs {
            let started = Instant::now();
            let (test, valid) = if epoch % self.config.eval_every == 0 && epoch != 0 {
                let (test, valid) = self.evaluate_both(epoch, log.as_deref_mut())?;
                (Some(test), Some(valid))
            } else {
                (None, None)
            };

            progress.set_message(format!("{}/{}", epoch + 1, n_epochs));
            let train_started = Instant::now();
            let loss = self.train_epoch(&progress)?;
            if let Some(log) = log.as_deref_mut() {
                log.add_scalar("train/loss", loss, epoch, train_started.elapsed().as_secs_f64())?;
            }
            let seconds = started.elapsed().as_secs_f64();
            log::debug!("{}/{} train loss: {:.6}\t {:.4}s", epoch + 1, n_epochs, loss, seconds);

            summaries.push(EpochSummary {
                epoch,
                train_loss: Some(loss),
                test,
                valid,
                seconds,
            });
        }
        progress.finish_and_clear();

        let started = Instant::now();
        let (test, valid) = self.evaluate_both(n_epochs, log.as_deref_mut())?;
        summaries.push(EpochSummary {
            epoch: n_epochs,
            train_loss: None,
            test: Some(test),
            valid: Some(valid),
            seconds: started.elapsed().as_secs_f64(),
        });
        if let Some(log) = log {
            log.flush()?;
        }
        Ok(summaries)
    }
}

/// 검증 분할 보충 + 표 형식 표준화
fn prepare(mut dataset: HmcDataset, modality: Modality, seed: u64) -> Result<HmcDataset> {
    if dataset.valid.is_none() {
        let (train, valid) = holdout(&dataset.train, HOLDOUT_FRACTION, seed);
        log::info!("✂️ 학습 분할에서 검증 분할 {}개를 떼어냅니다", valid.len());
        dataset.train = train;
        dataset.valid = Some(valid);
    }

    if modality == Modality::Tabular {
        let standardizer = {
            let mut fitted: Vec<&Split> = vec![&dataset.train];
            fitted.extend(dataset.valid.as_ref());
            Standardizer::fit(&fitted)?
        };
        standardizer.transform(&mut dataset.train);
        if let Some(valid) = dataset.valid.as_mut() {
            standardizer.transform(valid);
        }
        standardizer.transform(&mut dataset.test);
    }
    Ok(dataset)
}

fn feature_width(split: &Split, modality: Modality) -> Result<usize> {
    match modality {
        Modality::Image => Ok(0),
        Modality::Tabular if split.x.ndim() == 2 => Ok(split.x.shape()[1]),
        Modality::Tabular => Err(HmcError::ShapeMismatch(format!(
            "tabular features must be 2-D, got {:?}",
            split.x.shape()
        ))),
    }
}

/// 설정의 데이터 원천
pub fn dataset_source(config: &RunConfig) -> Result<Box<dyn DatasetSource>> {
    match (&config.data_dir, config.synthetic) {
        (Some(dir), None) => Ok(Box::new(NpyDirectory::new(dir, config.orientation))),
        (None, Some(labels)) => Ok(Box::new(Synthetic::new(labels, config.seed))),
        (None, None) => Err(HmcError::Config("one of --data-dir or --synthetic is required".into())),
        (Some(_), Some(_)) => Err(HmcError::Config("--data-dir and --synthetic are exclusive".into())),
    }
}

/// 데이터 로드 → 출력 디렉터리 → 학습
pub fn run(config: RunConfig) -> Result<Vec<EpochSummary>> {
    config.validate()?;
    let device = config.select_device()?;
    let dataset = dataset_source(&config)?.load()?;

    let mut log = RunLog::create(config.output_dir(Local::now()), &config)?;
    let mut trainer = Trainer::new(config, dataset, device)?;
    let summaries = trainer.fit(Some(&mut log))?;

    if let Some(test) = summaries.last().and_then(|s| s.test) {
        log::info!(
            "✅ 학습 완료: test acc {:.4}, jaccard {:.4}, nll {:.4}",
            test.accuracy,
            test.jaccard,
            test.nll
        );
    }
    Ok(summaries)
}

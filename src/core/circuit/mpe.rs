//! # 파라미터화된 회로 질의
//!
//! 자유 노드마다 `1 + S`개의 로짓 슬롯을 두고 `P(hi) = σ(Σ slots)` 로 가지 분포를 만든다.
//! 지역 정규화이므로 일관된 할당 위에서 합이 1이고 불일치 할당에는 0이다.
//! `num_reps`개의 복사본은 균등 혼합으로 묶인다.

use std::sync::Arc;

use candle_core::{DType, Tensor, D};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use super::compiled::{Child, Circuit};
use crate::core::error::{HmcError, Result};

/// 회로 + 예제별 파라미터
#[derive(Debug, Clone)]
pub struct CircuitMpe {
    circuit: Arc<Circuit>,
    slots: usize,
    num_reps: usize,
    params: Option<Tensor>,
}

impl CircuitMpe {
    pub fn new(circuit: Circuit, num_reps: usize) -> Result<Self> {
        if num_reps == 0 {
            return Err(HmcError::Config("num_reps must be at least 1".into()));
        }
        Ok(Self {
            circuit: Arc::new(circuit),
            slots: 1,
            num_reps,
            params: None,
        })
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn num_reps(&self) -> usize {
        self.num_reps
    }

    pub fn slots_per_node(&self) -> usize {
        self.slots
    }

    /// 자유 노드마다 `1 + s`개 슬롯. 같은 s로 다시 불러도 결과는 같다.
    pub fn overparameterize(&mut self, s: usize) {
        if self.slots != 1 + s {
            self.slots = 1 + s;
            // 폭이 바뀌었으므로 이전 파라미터는 무효
            self.params = None;
        }
    }

    /// 복사본 하나의 파라미터 수 (β)
    pub fn beta(&self) -> usize {
        self.circuit.num_free() * self.slots
    }

    /// 게이트 출력 폭 (β · reps)
    pub fn param_count(&self) -> usize {
        self.beta() * self.num_reps
    }

    /// (B, param_count) 파라미터 연결. 순전파마다 한 번.
    pub fn set_params(&mut self, thetas: &Tensor) -> Result<()> {
        let (_, width) = thetas.dims2()?;
        if width != self.param_count() {
            return Err(HmcError::ShapeMismatch(format!(
                "thetas have width {}, circuit expects {}",
                width,
                self.param_count()
            )));
        }
        self.params = Some(thetas.clone());
        Ok(())
    }

    fn params(&self) -> Result<&Tensor> {
        self.params.as_ref().ok_or(HmcError::ParamsNotSet)
    }

    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.params()?.dim(0)?)
    }

    /// (B, reps, free) 가지 로짓
    fn branch_logits(&self) -> Result<Tensor> {
        let params = self.params()?;
        let batch = params.dim(0)?;
        let free = self.circuit.num_free();
        Ok(params
            .reshape((batch, self.num_reps, free, self.slots))?
            .sum(D::Minus1)?)
    }

    /// 레이블 경로 지시자 (B, 1, free): hi 가지, lo 가지
    fn path_indicators(&self, labels: &Array2<bool>, like: &Tensor) -> Result<(Tensor, Tensor)> {
        let batch = like.dim(0)?;
        let free = self.circuit.num_free();
        if labels.dim() != (batch, self.circuit.num_vars()) {
            return Err(HmcError::ShapeMismatch(format!(
                "labels have shape {:?}, expected ({}, {})",
                labels.dim(),
                batch,
                self.circuit.num_vars()
            )));
        }

        let paths: Vec<Vec<(usize, bool)>> = labels
            .outer_iter()
            .into_par_iter()
            .enumerate()
            .map(|(row, y)| {
                self.circuit
                    .path(y)
                    .map_err(|var| HmcError::ZeroProbability { row, var })
            })
            .collect::<Result<_>>()?;

        let mut hi = vec![0f32; batch * free];
        let mut lo = vec![0f32; batch * free];
        for (b, steps) in paths.iter().enumerate() {
            for &(f, on) in steps {
                if on {
                    hi[b * free + f] = 1.0;
                } else {
                    lo[b * free + f] = 1.0;
                }
            }
        }
        let device = like.device();
        let dtype = like.dtype();
        Ok((
            Tensor::from_vec(hi, (batch, 1, free), device)?.to_dtype(dtype)?,
            Tensor::from_vec(lo, (batch, 1, free), device)?.to_dtype(dtype)?,
        ))
    }

    /// 관측 레이블의 예제별 음의 로그 가능도 (B,). 미분 가능.
    ///
    /// `log_space = true` 이면 복사본 혼합을 logsumexp로,
    /// `false` 이면 확률 영역 평균으로 계산한다 (작은 확률에서 언더플로).
    pub fn cross_entropy(&self, labels: &Array2<bool>, log_space: bool) -> Result<Tensor> {
        let logits = self.branch_logits()?;
        let (hi, lo) = self.path_indicators(labels, &logits)?;

        let log_hi = log_sigmoid(&logits)?;
        let log_lo = log_sigmoid(&logits.neg()?)?;
        // (B, reps)
        let per_rep = (hi.broadcast_mul(&log_hi)?.sum(2)? + lo.broadcast_mul(&log_lo)?.sum(2)?)?;

        let log_likelihood = if self.num_reps == 1 {
            per_rep.squeeze(1)?
        } else if log_space {
            let max = per_rep.max_keepdim(1)?;
            let shifted = per_rep.broadcast_sub(&max)?.exp()?.sum_keepdim(1)?.log()?;
            (shifted + max)?
                .squeeze(1)?
                .affine(1.0, -(self.num_reps as f64).ln())?
        } else {
            per_rep.exp()?.mean(1)?.log()?
        };
        Ok(log_likelihood.neg()?)
    }

    /// 예제별 로그 가능도 (CPU)
    pub fn log_likelihood(&self, labels: &Array2<bool>) -> Result<Vec<f32>> {
        let nll = self.cross_entropy(labels, true)?;
        Ok(nll.neg()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
    }

    /// 예제별 최빈 일관 할당 (B, N)
    pub fn get_mpe_inst(&self, batch_size: usize) -> Result<Array2<bool>> {
        let table = BranchTable::from_logits(&self.branch_logits()?)?;
        if table.batch != batch_size {
            return Err(HmcError::ShapeMismatch(format!(
                "requested MPE for {} examples, parameters cover {}",
                batch_size, table.batch
            )));
        }

        let n = self.circuit.num_vars();
        let rows: Vec<Vec<bool>> = (0..table.batch)
            .into_par_iter()
            .map(|b| self.best_instance(&table, b))
            .collect();

        let mut out = Array2::from_elem((batch_size, n), false);
        for (b, row) in rows.into_iter().enumerate() {
            for (v, on) in row.into_iter().enumerate() {
                out[[b, v]] = on;
            }
        }
        Ok(out)
    }

    /// 복사본별 MPE 중 혼합 가능도가 가장 높은 것 (복사본 하나면 정확)
    fn best_instance(&self, table: &BranchTable, b: usize) -> Vec<bool> {
        let candidates: Vec<Vec<bool>> = (0..table.reps)
            .map(|r| self.component_mpe(table, b, r))
            .collect();
        if candidates.len() == 1 {
            return candidates.into_iter().next().unwrap_or_default();
        }

        let mut best = (f64::NEG_INFINITY, 0usize);
        for (c, y) in candidates.iter().enumerate() {
            let y = ArrayView1::from(y.as_slice());
            let Ok(steps) = self.circuit.path(y) else {
                continue;
            };
            let per_rep: Vec<f64> = (0..table.reps)
                .map(|r| {
                    steps
                        .iter()
                        .map(|&(f, on)| table.log_prob(b, r, f, on))
                        .sum()
                })
                .collect();
            let score = log_mean_exp(&per_rep);
            if score > best.0 {
                best = (score, c);
            }
        }
        candidates.into_iter().nth(best.1).unwrap_or_default()
    }

    /// 상향 max 패스 후 하향 argmax
    fn component_mpe(&self, table: &BranchTable, b: usize, r: usize) -> Vec<bool> {
        let circuit = &self.circuit;
        let value = |child: Child, best: &[f64]| match child {
            Child::False => f64::NEG_INFINITY,
            Child::True => 0.0,
            Child::Node(i) => best[i as usize],
        };

        let mut best = Vec::with_capacity(circuit.node_count());
        for (i, node) in circuit.nodes().iter().enumerate() {
            let (lo, hi) = match circuit.free_index(i) {
                Some(f) => (
                    table.log_prob(b, r, f, false) + value(node.lo, &best),
                    table.log_prob(b, r, f, true) + value(node.hi, &best),
                ),
                None => (value(node.lo, &best), value(node.hi, &best)),
            };
            best.push(lo.max(hi));
        }

        let mut y = vec![false; circuit.num_vars()];
        let mut current = circuit.root();
        while let Child::Node(i) = current {
            let node = &circuit.nodes()[i as usize];
            let (lo, hi) = match circuit.free_index(i as usize) {
                Some(f) => (
                    table.log_prob(b, r, f, false) + value(node.lo, &best),
                    table.log_prob(b, r, f, true) + value(node.hi, &best),
                ),
                None => (value(node.lo, &best), value(node.hi, &best)),
            };
            let take_hi = hi > lo;
            y[circuit.order()[node.level as usize]] = take_hi;
            current = if take_hi { node.hi } else { node.lo };
        }
        y
    }
}

/// 수치적으로 안정한 `log σ(z) = min(z, 0) - log(1 + e^{-|z|})`
pub fn log_sigmoid(z: &Tensor) -> Result<Tensor> {
    let soft = z.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    Ok(z.minimum(0f32)?.sub(&soft)?)
}

fn log_mean_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + (sum / values.len() as f64).ln()
}

/// CPU로 옮긴 가지 로짓
struct BranchTable {
    logits: Vec<f32>,
    batch: usize,
    reps: usize,
    free: usize,
}

impl BranchTable {
    fn from_logits(logits: &Tensor) -> Result<Self> {
        let (batch, reps, free) = logits.dims3()?;
        let logits = logits.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        Ok(Self {
            logits,
            batch,
            reps,
            free,
        })
    }

    fn log_prob(&self, b: usize, r: usize, f: usize, hi: bool) -> f64 {
        let z = self.logits[(b * self.reps + r) * self.free + f] as f64;
        let z = if hi { z } else { -z };
        z.min(0.0) - (-z.abs()).exp().ln_1p()
    }
}

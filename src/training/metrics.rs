//! # 평가 지표
//!
//! 모든 지표는 평가 마스크(`to_eval`)가 켜진 열만 본다.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::core::error::{HmcError, Result};

fn masked_columns(mask: ArrayView1<bool>) -> Vec<usize> {
    mask.iter().enumerate().filter(|(_, &m)| m).map(|(c, _)| c).collect()
}

fn check_shapes(pred: ArrayView2<bool>, truth: ArrayView2<bool>, mask: ArrayView1<bool>) -> Result<()> {
    if pred.dim() != truth.dim() || pred.ncols() != mask.len() {
        return Err(HmcError::ShapeMismatch(format!(
            "prediction {:?}, truth {:?}, mask {}",
            pred.dim(),
            truth.dim(),
            mask.len()
        )));
    }
    Ok(())
}

/// 마스크 열이 전부 맞은 행의 비율
pub fn exact_accuracy(pred: ArrayView2<bool>, truth: ArrayView2<bool>, mask: ArrayView1<bool>) -> Result<f64> {
    check_shapes(pred, truth, mask)?;
    if pred.nrows() == 0 {
        return Ok(0.0);
    }
    let cols = masked_columns(mask);
    let correct = pred
        .outer_iter()
        .zip(truth.outer_iter())
        .filter(|(p, t)| cols.iter().all(|&c| p[c] == t[c]))
        .count();
    Ok(correct as f64 / pred.nrows() as f64)
}

/// 틀린 칸의 비율
pub fn hamming_loss(pred: ArrayView2<bool>, truth: ArrayView2<bool>, mask: ArrayView1<bool>) -> Result<f64> {
    check_shapes(pred, truth, mask)?;
    let cols = masked_columns(mask);
    let cells = pred.nrows() * cols.len();
    if cells == 0 {
        return Ok(0.0);
    }
    let wrong: usize = pred
        .outer_iter()
        .zip(truth.outer_iter())
        .map(|(p, t)| cols.iter().filter(|&&c| p[c] != t[c]).count())
        .sum();
    Ok(wrong as f64 / cells as f64)
}

/// micro Jaccard: `|pred ∧ truth| / |pred ∨ truth|` (분모 0이면 0)
pub fn micro_jaccard(pred: ArrayView2<bool>, truth: ArrayView2<bool>, mask: ArrayView1<bool>) -> Result<f64> {
    check_shapes(pred, truth, mask)?;
    let cols = masked_columns(mask);
    let (mut inter, mut union) = (0usize, 0usize);
    for (p, t) in pred.outer_iter().zip(truth.outer_iter()) {
        for &c in &cols {
            inter += (p[c] && t[c]) as usize;
            union += (p[c] || t[c]) as usize;
        }
    }
    Ok(if union == 0 { 0.0 } else { inter as f64 / union as f64 })
}

/// micro 평균 정밀도. 같은 점수는 하나의 임계값으로 묶는다.
pub fn micro_average_precision(
    scores: ArrayView2<f32>,
    truth: ArrayView2<bool>,
    mask: ArrayView1<bool>,
) -> Result<f64> {
    if scores.dim() != truth.dim() || scores.ncols() != mask.len() {
        return Err(HmcError::ShapeMismatch(format!(
            "scores {:?}, truth {:?}, mask {}",
            scores.dim(),
            truth.dim(),
            mask.len()
        )));
    }
    let cols = masked_columns(mask);
    let mut cells: Vec<(f32, bool)> = Vec::with_capacity(scores.nrows() * cols.len());
    for (s, t) in scores.outer_iter().zip(truth.outer_iter()) {
        cells.extend(cols.iter().map(|&c| (s[c], t[c])));
    }
    let positives = cells.iter().filter(|(_, t)| *t).count();
    if positives == 0 {
        return Ok(0.0);
    }
    cells.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (mut tp, mut fp) = (0usize, 0usize);
    let (mut ap, mut prev_recall) = (0f64, 0f64);
    let mut i = 0;
    while i < cells.len() {
        let threshold = cells[i].0;
        while i < cells.len() && cells[i].0 == threshold {
            if cells[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / positives as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Ok(ap)
}

/// 한 분할의 회로 평가 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub accuracy: f64,
    pub hamming: f64,
    pub jaccard: f64,
    pub nll: f64,
}

impl EvalMetrics {
    pub fn compute(pred: &Array2<bool>, truth: &Array2<bool>, mask: ArrayView1<bool>, nll: f64) -> Result<Self> {
        Ok(Self {
            accuracy: exact_accuracy(pred.view(), truth.view(), mask)?,
            hamming: hamming_loss(pred.view(), truth.view(), mask)?,
            jaccard: micro_jaccard(pred.view(), truth.view(), mask)?,
            nll,
        })
    }

    /// `<prefix>/<metric>` 이름의 스칼라 목록
    pub fn scalars(&self, prefix: &str) -> Vec<(String, f64)> {
        vec![
            (format!("{}/accuracy", prefix), self.accuracy),
            (format!("{}/hamming", prefix), self.hamming),
            (format!("{}/jaccard", prefix), self.jaccard),
            (format!("{}/nll", prefix), self.nll),
        ]
    }
}

/// 투영된 시그모이드 점수 평가 결과
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedMetrics {
    pub jaccard: f64,
    pub average_precision: f64,
    pub num_correct: usize,
}

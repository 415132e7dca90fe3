use candle_core::{Device, Tensor};
use ndarray::{Array2, ArrayView2};

use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::AncestorMatrix;

/// 계층 제약 투영 (추론 전용)
///
/// `y[k] = max_{j : R[j][k] = 1} x[j]`. 조상이 아닌 위치는 0이 아니라 -∞로 가린다.
/// 학습 파라미터가 없으며 결정적이다.
#[derive(Debug, Clone)]
pub struct ConstraintProjection {
    /// (N, N) u8, `mask[j][k] = R[j][k]`
    mask: Tensor,
    num_labels: usize,
}

impl ConstraintProjection {
    pub fn new(ancestors: &AncestorMatrix, device: &Device) -> Result<Self> {
        Ok(Self {
            mask: ancestors.to_mask_tensor(device)?,
            num_labels: ancestors.len(),
        })
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// (B, N) 점수 → (B, N) 계층 일관 점수
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (batch, n) = x.dims2()?;
        if n != self.num_labels {
            return Err(HmcError::ShapeMismatch(format!(
                "scores have {} labels, projection expects {}",
                n, self.num_labels
            )));
        }
        let shape = (batch, n, n);
        // scores[b, j, k] = x[b, j]
        let scores = x.unsqueeze(2)?.broadcast_as(shape)?;
        let mask = self.mask.unsqueeze(0)?.broadcast_as(shape)?;
        let neg_inf = Tensor::full(f32::NEG_INFINITY, shape, x.device())?.to_dtype(x.dtype())?;
        let masked = mask.where_cond(&scores, &neg_inf)?;
        Ok(masked.max(1)?)
    }
}

/// 투영이 없으면 항등 함수
pub fn project(x: &Tensor, projection: Option<&ConstraintProjection>) -> Result<Tensor> {
    match projection {
        Some(p) => p.forward(x),
        None => Ok(x.clone()),
    }
}

/// 메트릭/테스트용 CPU 버전
pub fn project_rows(x: ArrayView2<f32>, ancestors: &AncestorMatrix) -> Array2<f32> {
    let (batch, n) = x.dim();
    Array2::from_shape_fn((batch, n), |(b, k)| {
        ancestors
            .ancestors_of(k)
            .iter()
            .map(|&j| x[[b, j]])
            .fold(x[[b, k]], f32::max)
    })
}

//! # 게이트 함수
//!
//! 임베딩 (B, emb) → 회로 파라미터 (B, param_count).
//! 층 폭은 `[emb] + [hidden] * gates + [param_count]`, 층 사이에 ReLU.

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use crate::core::error::{HmcError, Result};

#[derive(Debug, Clone)]
pub struct DenseGate {
    layers: Vec<Linear>,
    output_width: usize,
}

impl DenseGate {
    pub fn new(
        emb_size: usize,
        hidden: usize,
        gates: usize,
        output_width: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if output_width == 0 {
            return Err(HmcError::Config("gate output width is zero".into()));
        }
        let mut widths = Vec::with_capacity(gates + 2);
        widths.push(emb_size);
        widths.extend(std::iter::repeat(hidden).take(gates));
        widths.push(output_width);

        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("layer{}", i))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            output_width,
        })
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn forward(&self, emb: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = emb.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        Ok(x)
    }
}

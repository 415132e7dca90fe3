//! 시드 고정 파라미터 초기화
//!
//! CPU 백엔드 난수는 시드를 받지 않으므로 `VarMap`의 모든 변수를
//! `StdRng`에서 다시 뽑는다. 분포는 `U(-1/√fan_in, 1/√fan_in)`.

use candle_core::Tensor;
use candle_nn::VarMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::error::{HmcError, Result};

/// 가중치 텐서의 fan_in. 선형 `(out, in)`, 합성곱 `(out, in, kh, kw)`.
fn fan_in(dims: &[usize]) -> usize {
    match dims {
        [_, rest @ ..] if !rest.is_empty() => rest.iter().product(),
        [n] => *n,
        _ => 1,
    }
}

/// 이름 순으로 정렬해 재초기화 (같은 시드면 같은 값)
pub fn reinitialize(varmap: &VarMap, seed: u64) -> Result<()> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|_| HmcError::Config("variable map lock is poisoned".into()))?;

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    let mut rng = StdRng::seed_from_u64(seed);
    for name in names {
        let var = &vars[name];
        // 편향은 짝이 되는 가중치의 fan_in을 쓴다
        let fan = match name.strip_suffix(".bias") {
            Some(prefix) => vars
                .get(&format!("{}.weight", prefix))
                .map(|w| fan_in(w.dims()))
                .unwrap_or_else(|| fan_in(var.dims())),
            None => fan_in(var.dims()),
        };
        let bound = 1.0 / (fan.max(1) as f32).sqrt();
        let values: Vec<f32> = (0..var.elem_count())
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let fresh = Tensor::from_vec(values, var.shape().clone(), var.device())?.to_dtype(var.dtype())?;
        var.set(&fresh)?;
    }
    log::debug!("🎲 파라미터 {}개 텐서를 시드 {}로 초기화", vars.len(), seed);
    Ok(())
}

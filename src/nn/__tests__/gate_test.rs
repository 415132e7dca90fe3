use crate::core::circuit::{compile, CircuitMpe};
use crate::core::hierarchy::{Adjacency, AncestorMatrix};
use crate::nn::DenseGate;
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

#[test]
fn 게이트_출력폭은_회로_파라미터수_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(4, &[(0, 1), (0, 2), (2, 3)])?)?;
    let mut mpe = CircuitMpe::new(compile(&r)?, 2)?;
    mpe.overparameterize(1);

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let gate = DenseGate::new(8, 16, 2, mpe.param_count(), vb)?;
    assert_eq!(gate.num_layers(), 3);
    assert_eq!(gate.output_width(), mpe.param_count());

    let emb = Tensor::randn(0f32, 1.0, (5, 8), &Device::Cpu)?;
    let thetas = gate.forward(&emb)?;
    assert_eq!(thetas.dims(), &[5, mpe.param_count()]);
    mpe.set_params(&thetas)?;
    r.check_labels(mpe.get_mpe_inst(5)?.view())?;
    Ok(())
}

#[test]
fn 은닉층_없는_게이트_테스트() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let gate = DenseGate::new(4, 32, 0, 3, vb)?;
    assert_eq!(gate.num_layers(), 1);
    assert_eq!(varmap.all_vars().len(), 2);
    Ok(())
}

use crate::core::error::HmcError;
use crate::core::hierarchy::{Adjacency, AncestorMatrix};
use crate::nn::{reinitialize, Backbone, BackboneConfig, Modality, NonLinearity};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

fn tabular(input_dim: usize, emb_size: usize) -> BackboneConfig {
    BackboneConfig {
        input_dim,
        hidden_dim: 16,
        emb_size,
        num_labels: 3,
        num_layers: 3,
        dropout: 0.5,
        ..BackboneConfig::default()
    }
}

#[test]
fn 표형식_임베딩_모양_테스트() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let backbone = Backbone::new(&tabular(10, 8), None, vb)?;

    let x = Tensor::randn(0f32, 1.0, (4, 10), &Device::Cpu)?;
    assert_eq!(backbone.embed(&x, true)?.dims(), &[4, 8]);
    assert_eq!(backbone.emb_size(), 8);

    // 평가 모드에서는 드롭아웃이 꺼져 결정적
    let a = backbone.embed(&x, false)?.to_vec2::<f32>()?;
    let b = backbone.embed(&x, false)?.to_vec2::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn 평가_점수는_계층을_만족_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(3, &[(0, 1), (1, 2)])?)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = BackboneConfig {
        non_lin: NonLinearity::Tanh,
        ..tabular(5, 3)
    };
    let backbone = Backbone::new(&config, Some(&r), vb)?;

    let x = Tensor::randn(0f32, 1.0, (16, 5), &Device::Cpu)?;
    for scores in [
        backbone.score_with_sigmoid(&x, false)?.to_vec2::<f32>()?,
        backbone.score_with_log_sigmoid(&x, false)?.to_vec2::<f32>()?,
    ] {
        for row in scores {
            // 투영 후 자손 점수는 조상 점수 이상
            assert!(row[1] >= row[0] && row[2] >= row[1], "{:?}", row);
        }
    }

    let probs = backbone.score_with_sigmoid(&x, false)?.flatten_all()?.to_vec1::<f32>()?;
    assert!(probs.iter().all(|&p| (0.0..=1.0).contains(&p)));
    let logs = backbone.score_with_log_sigmoid(&x, false)?.flatten_all()?.to_vec1::<f32>()?;
    assert!(logs.iter().all(|&v| v <= 0.0));
    Ok(())
}

#[test]
fn 이미지_트렁크_임베딩_모양_테스트() -> Result<()> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = BackboneConfig {
        modality: Modality::Image,
        ..tabular(0, 6)
    };
    let backbone = Backbone::new(&config, None, vb)?;

    let x = Tensor::randn(0f32, 1.0, (2, 3, 40, 40), &Device::Cpu)?;
    assert_eq!(backbone.embed(&x, false)?.dims(), &[2, 6]);
    Ok(())
}

#[test]
fn 시드_재초기화는_재현적_테스트() -> Result<()> {
    let x = Tensor::randn(0f32, 1.0, (3, 7), &Device::Cpu)?;
    let build = |seed: u64| -> Result<Vec<Vec<f32>>> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let backbone = Backbone::new(&tabular(7, 4), None, vb)?;
        reinitialize(&varmap, seed)?;
        Ok(backbone.embed(&x, false)?.to_vec2::<f32>()?)
    };

    assert_eq!(build(7)?, build(7)?);
    assert_ne!(build(7)?, build(8)?);
    Ok(())
}

#[test]
fn 잘못된_설정_거부_테스트() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = BackboneConfig {
        num_layers: 0,
        ..tabular(4, 4)
    };
    assert!(Backbone::new(&config, None, vb.clone()).is_err());

    let config = BackboneConfig {
        dropout: 1.5,
        ..tabular(4, 4)
    };
    assert!(Backbone::new(&config, None, vb).is_err());
}

#[test]
fn 점수_폭은_레이블_수_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(3, &[(0, 1), (1, 2)])?)?;
    let x = Tensor::randn(0f32, 1.0, (4, 10), &Device::Cpu)?;

    // 임베딩이 레이블 수보다 넓어도 점수는 레이블 폭
    for ancestors in [None, Some(&r)] {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let backbone = Backbone::new(&tabular(10, 16), ancestors, vb)?;
        assert_eq!(backbone.num_labels(), 3);
        assert_eq!(backbone.embed(&x, false)?.dims(), &[4, 16]);
        assert_eq!(backbone.score_with_sigmoid(&x, false)?.dims(), &[4, 3]);
        assert_eq!(backbone.score_with_log_sigmoid(&x, true)?.dims(), &[4, 3]);
    }
    Ok(())
}

#[test]
fn 계층과_헤드_폭_불일치_거부_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(4, &[(0, 1)])?)?;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    assert!(matches!(
        Backbone::new(&tabular(5, 8), Some(&r), vb.clone()),
        Err(HmcError::ShapeMismatch(_))
    ));

    let config = BackboneConfig {
        num_labels: 0,
        ..tabular(5, 8)
    };
    assert!(matches!(Backbone::new(&config, None, vb), Err(HmcError::Config(_))));
    Ok(())
}

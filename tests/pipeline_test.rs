use anyhow::Result;
use candle_core::{Device, Tensor};
use hmc_circuit::core::circuit::{compile, CircuitMpe, CircuitStore};
use hmc_circuit::core::hierarchy::{write_npy, Adjacency, AncestorMatrix, NpyDtype, Orientation, Taxonomy};
use hmc_circuit::core::projection::ConstraintProjection;
use hmc_circuit::training::{read_scalars, run, RunConfig};
use ndarray::{array, ArrayD, IxDyn};

#[test]
fn 체인_계층_투영_시나리오() -> Result<()> {
    println!("=== 체인 0→1→2 투영 ===");
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(3, &[(0, 1), (1, 2)])?)?;
    let projection = ConstraintProjection::new(&r, &Device::Cpu)?;

    let x = Tensor::new(&[[0.2f32, 0.9, 0.1]], &Device::Cpu)?;
    let y = projection.forward(&x)?.to_vec2::<f32>()?;
    assert_eq!(y, vec![vec![0.2, 0.9, 0.9]]);
    println!("✅ 투영 결과: {:?}", y[0]);
    Ok(())
}

#[test]
fn 분류_체계_경로로_만든_회로() -> Result<()> {
    let taxonomy = Taxonomy::from_paths(&[
        vec!["animal", "bird", "sparrow"],
        vec!["animal", "bird", "owl"],
        vec!["animal", "fish"],
    ])?;
    let r = AncestorMatrix::from_adjacency(taxonomy.adjacency())?;
    let circuit = compile(&r)?;

    let owl = taxonomy.label_vector(&["animal", "bird", "owl"])?;
    assert!(circuit.evaluate(owl.view()));
    r.check_labels(owl.view().insert_axis(ndarray::Axis(0)))?;

    assert!(circuit.model_count() > taxonomy.labels().len() as f64);
    Ok(())
}

#[test]
fn 회로_캐시_왕복은_같은_손실() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let r = AncestorMatrix::from_adjacency(&Adjacency::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)])?)?;
    let store = CircuitStore::new(dir.path());

    let fresh = store.load_or_compile("diamond_others", &r)?;
    let key = CircuitStore::key("diamond_others", &r);
    let cached = store.load(&key, &r)?.ok_or_else(|| anyhow::anyhow!("캐시 없음"))?;

    let labels = array![[true, true, true, true], [true, false, true, false], [false, false, false, false]];
    let mut losses = Vec::new();
    for circuit in [fresh, cached] {
        let mut mpe = CircuitMpe::new(circuit, 2)?;
        mpe.overparameterize(1);
        let thetas = Tensor::arange(0f32, (3 * mpe.param_count()) as f32, &Device::Cpu)?
            .reshape((3, mpe.param_count()))?
            .affine(0.01, -0.2)?
            .sin()?;
        mpe.set_params(&thetas)?;
        losses.push(mpe.cross_entropy(&labels, true)?.to_vec1::<f32>()?);
    }
    assert_eq!(losses[0], losses[1]);
    Ok(())
}

#[test]
fn npy_디렉터리_학습_전과정() -> Result<()> {
    println!("=== .npy 디렉토리 학습 ===");
    let data = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;

    // 트리 0→{1,2}, 1→3. 레이블은 첫 특성 부호와 둘째 특성 부호로 결정
    let hierarchy = ArrayD::from_shape_vec(
        IxDyn(&[4, 4]),
        vec![0., 1., 1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 0., 0., 0., 0.],
    )?;
    write_npy(data.path().join("hierarchy.npy"), &hierarchy, NpyDtype::U8)?;

    for (split, rows) in [("train", 60usize), ("valid", 20), ("test", 20)] {
        let mut x = Vec::with_capacity(rows * 3);
        let mut y = Vec::with_capacity(rows * 4);
        for i in 0..rows {
            let a = ((i * 7) % 11) as f64 - 5.0;
            let b = ((i * 5) % 13) as f64 - 6.0;
            x.extend([a, b, (i % 3) as f64]);
            let root = a > -3.0;
            let left = root && b > 0.0;
            let right = root && !left;
            let deep = left && a > 0.0;
            y.extend([root, left, right, deep].map(|v| if v { 1.0 } else { 0.0 }));
        }
        write_npy(
            data.path().join(format!("{}_x.npy", split)),
            &ArrayD::from_shape_vec(IxDyn(&[rows, 3]), x)?,
            NpyDtype::F64,
        )?;
        write_npy(
            data.path().join(format!("{}_y.npy", split)),
            &ArrayD::from_shape_vec(IxDyn(&[rows, 4]), y)?,
            NpyDtype::Bool,
        )?;
    }

    let config = RunConfig {
        dataset: "toy_others".into(),
        data_dir: Some(data.path().to_path_buf()),
        orientation: Orientation::ParentToChild,
        batch_size: 16,
        lr: 5e-3,
        n_epochs: 4,
        eval_every: 2,
        emb_size: 8,
        hidden_dim: Some(16),
        gate_hidden: 16,
        num_layers: 2,
        dropout: 0.1,
        num_reps: 2,
        output: out.path().to_path_buf(),
        exp_id: Some("toy".into()),
        constraints_dir: out.path().join("constraints"),
        quiet: true,
        ..Default::default()
    };
    let summaries = run(config.clone())?;
    assert_eq!(summaries.len(), 5);

    let run_dir = out.path().join("toy");
    let args: RunConfig = serde_json::from_str(&std::fs::read_to_string(run_dir.join("args.json"))?)?;
    assert_eq!(args, config);

    let scalars = read_scalars(run_dir.join("runs").join("scalars.jsonl"))?;
    let evals: Vec<_> = scalars.iter().filter(|s| s.name.starts_with("param_sdd/")).collect();
    // 2 에포크 + 최종, test/valid 각 4개 지표
    assert_eq!(evals.len(), 2 * 2 * 4);
    assert!(evals.iter().any(|s| s.name == "param_sdd/valid/jaccard" && s.epoch == 4));
    // walltime은 평가에 걸린 시간 (절대 시각이 아님)
    assert!(evals.iter().all(|s| s.walltime >= 0.0 && s.walltime < 3600.0));
    println!("✅ 스칼라 {}개 기록", scalars.len());
    Ok(())
}

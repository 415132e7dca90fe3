use std::path::Path;

use crate::core::error::HmcError;
use crate::core::hierarchy::{write_npy, AncestorMatrix, NpyDtype, Orientation};
use crate::training::{holdout, DatasetSource, NpyDirectory, Split, Standardizer, Synthetic};
use anyhow::Result;
use approx::assert_relative_eq;
use ndarray::{array, Array2, ArrayD, IxDyn};

fn write(dir: &Path, name: &str, shape: &[usize], values: Vec<f64>, dtype: NpyDtype) -> Result<()> {
    let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
    write_npy(dir.join(name), &array, dtype)?;
    Ok(())
}

/// 체인 0→1→2 계층의 작은 데이터 디렉터리 (valid 없음)
fn write_chain_dataset(dir: &Path) -> Result<()> {
    write(dir, "train_x.npy", &[4, 2], vec![0.0, 1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0, 7.0], NpyDtype::F32)?;
    write(
        dir,
        "train_y.npy",
        &[4, 3],
        vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0],
        NpyDtype::Bool,
    )?;
    write(dir, "test_x.npy", &[1, 2], vec![1.0, 1.0], NpyDtype::F32)?;
    write(dir, "test_y.npy", &[1, 3], vec![1.0, 0.0, 0.0], NpyDtype::U8)?;
    write(
        dir,
        "hierarchy.npy",
        &[3, 3],
        vec![0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        NpyDtype::I64,
    )?;
    write(dir, "to_eval.npy", &[3], vec![0.0, 1.0, 1.0], NpyDtype::Bool)?;
    Ok(())
}

#[test]
fn npy_디렉터리_로드_테스트() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_chain_dataset(dir.path())?;

    let dataset = NpyDirectory::new(dir.path(), Orientation::ParentToChild).load()?;
    assert_eq!(dataset.train.len(), 4);
    assert!(dataset.valid.is_none());
    assert_eq!(dataset.test.len(), 1);
    assert_eq!(dataset.num_labels(), 3);
    assert_eq!(dataset.to_eval, array![false, true, true]);
    assert!(dataset.train.x[[1, 1]].is_nan());

    let adjacency = dataset.adjacency.clone().ok_or_else(|| anyhow::anyhow!("계층 없음"))?;
    let r = AncestorMatrix::from_adjacency(&adjacency)?;
    assert!(r.is_ancestor(0, 2));
    dataset.check_labels(&r)?;
    Ok(())
}

#[test]
fn 불일치_레이블_검출_테스트() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_chain_dataset(dir.path())?;
    // 부모 없이 자식만 켜진 행
    write(dir.path(), "test_y.npy", &[1, 3], vec![0.0, 1.0, 1.0], NpyDtype::Bool)?;

    let dataset = NpyDirectory::new(dir.path(), Orientation::ParentToChild).load()?;
    let adjacency = dataset.adjacency.clone().ok_or_else(|| anyhow::anyhow!("계층 없음"))?;
    let r = AncestorMatrix::from_adjacency(&adjacency)?;
    assert!(matches!(
        dataset.check_labels(&r),
        Err(HmcError::InconsistentLabels { row: 0, .. })
    ));
    Ok(())
}

#[test]
fn 학습_분할_누락은_설정_오류_테스트() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let result = NpyDirectory::new(dir.path(), Orientation::ParentToChild).load();
    assert!(matches!(result, Err(HmcError::Config(_))));
    Ok(())
}

#[test]
fn 합성_데이터는_계층과_일관_테스트() -> Result<()> {
    let dataset = Synthetic::new(6, 7).load()?;
    let adjacency = dataset.adjacency.clone().ok_or_else(|| anyhow::anyhow!("계층 없음"))?;
    let r = AncestorMatrix::from_adjacency(&adjacency)?;
    dataset.check_labels(&r)?;

    assert_eq!(dataset.train.len(), 400);
    assert_eq!(dataset.train.x.shape(), &[400, 16]);
    assert!(!dataset.to_eval[0]);
    // 루트가 켜진 예제와 꺼진 예제가 모두 있다
    let on = dataset.train.y.column(0).iter().filter(|&&b| b).count();
    assert!(on > 0 && on < 400);

    let again = Synthetic::new(6, 7).load()?;
    assert_eq!(again.train.y, dataset.train.y);
    Ok(())
}

#[test]
fn 검증_분할_떼어내기_테스트() -> Result<()> {
    let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f32).into_dyn();
    let y = Array2::from_shape_fn((10, 1), |(i, _)| i % 2 == 0);
    let split = Split::new(x, y)?;

    let (train, valid) = holdout(&split, 0.3, 42);
    assert_eq!(train.len(), 7);
    assert_eq!(valid.len(), 3);

    let mut firsts: Vec<i32> = train
        .x
        .outer_iter()
        .chain(valid.x.outer_iter())
        .map(|row| row.iter().next().copied().unwrap_or_default() as i32)
        .collect();
    firsts.sort_unstable();
    assert_eq!(firsts, (0..10).map(|i| i * 2).collect::<Vec<_>>());

    let (again, _) = holdout(&split, 0.3, 42);
    assert_eq!(again.x, train.x);
    Ok(())
}

#[test]
fn 표준화와_결측치_대체_테스트() -> Result<()> {
    let x = array![[1.0f32, 10.0], [3.0, f32::NAN], [5.0, 10.0]].into_dyn();
    let y = Array2::from_elem((3, 1), false);
    let mut split = Split::new(x, y)?;

    let standardizer = Standardizer::fit(&[&split])?;
    standardizer.transform(&mut split);

    let x = split.x.into_dimensionality::<ndarray::Ix2>()?;
    let column: Vec<f32> = x.column(0).to_vec();
    assert_relative_eq!(column.iter().sum::<f32>(), 0.0, epsilon = 1e-6);
    assert_relative_eq!(column[2], -column[0], epsilon = 1e-6);
    // 분산 0인 열은 평균만 빠지고 결측치는 평균으로 채워진다
    for v in x.column(1) {
        assert_relative_eq!(*v, 0.0, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn 모양이_맞지_않는_분할_거부_테스트() {
    let x = ArrayD::<f32>::zeros(IxDyn(&[3, 2]));
    let y = Array2::from_elem((2, 1), false);
    assert!(matches!(Split::new(x, y), Err(HmcError::ShapeMismatch(_))));
}

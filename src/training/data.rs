//! # 데이터 협력자
//!
//! 분할 로드(`.npy` 디렉터리, 합성 데이터), 검증 분할 떼어내기, 표 형식 표준화.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use ndarray::{Array1, Array2, ArrayD, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::{read_npy, Adjacency, AncestorMatrix, Orientation};

/// 첫 축이 예제 축인 특성과 레이블
#[derive(Debug, Clone)]
pub struct Split {
    pub x: ArrayD<f32>,
    pub y: Array2<bool>,
}

impl Split {
    pub fn new(x: ArrayD<f32>, y: Array2<bool>) -> Result<Self> {
        if x.ndim() < 2 || x.shape()[0] != y.nrows() {
            return Err(HmcError::ShapeMismatch(format!(
                "features {:?} do not match {} label rows",
                x.shape(),
                y.nrows()
            )));
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.y.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_labels(&self) -> usize {
        self.y.ncols()
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// 특성 배치 텐서 (f32, 원래 모양)
    pub fn features(&self, indices: &[usize], device: &Device) -> Result<Tensor> {
        let batch = self.x.select(Axis(0), indices);
        let shape = batch.shape().to_vec();
        let values: Vec<f32> = batch.iter().copied().collect();
        Ok(Tensor::from_vec(values, shape, device)?)
    }

    pub fn labels(&self, indices: &[usize]) -> Array2<bool> {
        self.y.select(Axis(0), indices)
    }
}

/// 학습/검증/평가 분할 + 선택적 계층 + 평가 마스크
#[derive(Debug, Clone)]
pub struct HmcDataset {
    pub train: Split,
    pub valid: Option<Split>,
    pub test: Split,
    pub adjacency: Option<Adjacency>,
    pub to_eval: Array1<bool>,
}

impl HmcDataset {
    pub fn num_labels(&self) -> usize {
        self.train.num_labels()
    }

    /// 분할마다 레이블 폭과 계층 일관성 검사
    pub fn check_labels(&self, r: &AncestorMatrix) -> Result<()> {
        for split in self.splits() {
            r.check_labels(split.y.view())?;
        }
        if self.to_eval.len() != self.num_labels() {
            return Err(HmcError::ShapeMismatch(format!(
                "to_eval has {} entries for {} labels",
                self.to_eval.len(),
                self.num_labels()
            )));
        }
        Ok(())
    }

    fn splits(&self) -> impl Iterator<Item = &Split> {
        std::iter::once(&self.train)
            .chain(self.valid.as_ref())
            .chain(std::iter::once(&self.test))
    }
}

/// 데이터셋 로더 협력자
pub trait DatasetSource {
    fn load(&self) -> Result<HmcDataset>;
}

/// `{train,valid,test}_{x,y}.npy` + 선택적 `hierarchy.npy`, `to_eval.npy`
#[derive(Debug, Clone)]
pub struct NpyDirectory {
    dir: PathBuf,
    orientation: Orientation,
}

impl NpyDirectory {
    pub fn new(dir: impl Into<PathBuf>, orientation: Orientation) -> Self {
        Self {
            dir: dir.into(),
            orientation,
        }
    }

    fn load_split(&self, name: &str) -> Result<Option<Split>> {
        let x_path = self.dir.join(format!("{}_x.npy", name));
        let y_path = self.dir.join(format!("{}_y.npy", name));
        if !x_path.exists() && !y_path.exists() {
            return Ok(None);
        }
        let x = read_npy(&x_path)?.to_f32();
        let y = read_npy(&y_path)?
            .to_bool()
            .into_dimensionality::<Ix2>()
            .map_err(|_| npy_shape_error(&y_path, "labels must be 2-D"))?;
        Split::new(x, y).map(Some)
    }
}

fn npy_shape_error(path: &Path, reason: &str) -> HmcError {
    HmcError::Npy {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl DatasetSource for NpyDirectory {
    fn load(&self) -> Result<HmcDataset> {
        let missing = |name: &str| HmcError::Config(format!("{}/{}_x.npy is missing", self.dir.display(), name));
        let train = self.load_split("train")?.ok_or_else(|| missing("train"))?;
        let valid = self.load_split("valid")?;
        let test = self.load_split("test")?.ok_or_else(|| missing("test"))?;

        let hierarchy_path = self.dir.join("hierarchy.npy");
        let adjacency = if hierarchy_path.exists() {
            Some(crate::core::hierarchy::load_adjacency(&hierarchy_path, self.orientation)?)
        } else {
            None
        };

        let mask_path = self.dir.join("to_eval.npy");
        let to_eval = if mask_path.exists() {
            read_npy(&mask_path)?
                .to_bool()
                .into_dimensionality::<Ix1>()
                .map_err(|_| npy_shape_error(&mask_path, "to_eval must be 1-D"))?
        } else {
            Array1::from_elem(train.num_labels(), true)
        };

        log::info!(
            "📂 데이터 로드: {} (train {}, valid {}, test {}, 레이블 {}개)",
            self.dir.display(),
            train.len(),
            valid.as_ref().map_or(0, Split::len),
            test.len(),
            train.num_labels()
        );
        Ok(HmcDataset {
            train,
            valid,
            test,
            adjacency,
            to_eval,
        })
    }
}

/// 무작위 트리 계층과 선형 생성 레이블 (데모/테스트용)
#[derive(Debug, Clone)]
pub struct Synthetic {
    pub num_labels: usize,
    pub num_features: usize,
    pub sizes: (usize, usize, usize),
    pub seed: u64,
}

impl Synthetic {
    pub fn new(num_labels: usize, seed: u64) -> Self {
        Self {
            num_labels,
            num_features: 16,
            sizes: (400, 100, 100),
            seed,
        }
    }
}

impl DatasetSource for Synthetic {
    fn load(&self) -> Result<HmcDataset> {
        let n = self.num_labels;
        let d = self.num_features;
        if n == 0 || d == 0 {
            return Err(HmcError::Config("synthetic dataset needs labels and features".into()));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);

        // 노드 i > 0의 부모는 더 작은 번호
        let parents: Vec<usize> = (0..n).map(|i| if i == 0 { 0 } else { rng.gen_range(0..i) }).collect();
        let edges: Vec<(usize, usize)> = (1..n).map(|i| (parents[i], i)).collect();
        let adjacency = Adjacency::from_edges(n, &edges)?;

        let weights = Array2::from_shape_fn((d, n), |_| rng.gen_range(-1.0f32..1.0));
        let bias = Array1::from_shape_fn(n, |_| rng.gen_range(0.0f32..0.5));

        let mut generate = |rows: usize| -> Result<Split> {
            let x = Array2::from_shape_fn((rows, d), |_| rng.gen_range(-1.0f32..1.0));
            let scores = x.dot(&weights) + &bias;
            let mut y = Array2::from_elem((rows, n), false);
            for r in 0..rows {
                for j in 0..n {
                    let parent_on = j == 0 || y[[r, parents[j]]];
                    y[[r, j]] = parent_on && scores[[r, j]] > 0.0;
                }
            }
            Split::new(x.into_dyn(), y)
        };

        let (train, valid, test) = self.sizes;
        let train = generate(train)?;
        let valid = generate(valid)?;
        let test = generate(test)?;

        // 루트 노드는 평가에서 뺀다
        let mut to_eval = Array1::from_elem(n, true);
        if n > 1 {
            to_eval[0] = false;
        }
        Ok(HmcDataset {
            train,
            valid: Some(valid),
            test,
            adjacency: Some(adjacency),
            to_eval,
        })
    }
}

/// 실행 시드로 학습 분할의 `fraction`을 검증 분할로 떼어낸다
pub fn holdout(split: &Split, fraction: f64, seed: u64) -> (Split, Split) {
    let mut indices: Vec<usize> = (0..split.len()).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let held = ((split.len() as f64) * fraction).round() as usize;
    let (valid, train) = indices.split_at(held.min(split.len()));
    (split.select(train), split.select(valid))
}

/// NaN을 무시한 열 평균/표준편차. NaN은 평균으로 채우고 표준화한다 (std 0 → 1).
#[derive(Debug, Clone)]
pub struct Standardizer {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl Standardizer {
    pub fn fit(splits: &[&Split]) -> Result<Self> {
        let cols = match splits.first() {
            Some(s) if s.x.ndim() == 2 => s.x.shape()[1],
            _ => return Err(HmcError::Config("standardizer needs 2-D tabular features".into())),
        };
        let mut sum = vec![0f64; cols];
        let mut sq = vec![0f64; cols];
        let mut count = vec![0usize; cols];
        for split in splits {
            if split.x.ndim() != 2 || split.x.shape()[1] != cols {
                return Err(HmcError::ShapeMismatch("splits have different feature widths".into()));
            }
            for row in split.x.outer_iter() {
                for (c, &v) in row.iter().enumerate() {
                    if !v.is_nan() {
                        sum[c] += v as f64;
                        sq[c] += (v as f64) * (v as f64);
                        count[c] += 1;
                    }
                }
            }
        }

        let mean: Array1<f32> = (0..cols)
            .map(|c| if count[c] == 0 { 0.0 } else { (sum[c] / count[c] as f64) as f32 })
            .collect();
        let std: Array1<f32> = (0..cols)
            .map(|c| {
                if count[c] == 0 {
                    return 1.0;
                }
                let m = sum[c] / count[c] as f64;
                let var = (sq[c] / count[c] as f64 - m * m).max(0.0);
                if var > 0.0 {
                    var.sqrt() as f32
                } else {
                    1.0
                }
            })
            .collect();
        Ok(Self { mean, std })
    }

    pub fn transform(&self, split: &mut Split) {
        let cols = self.mean.len();
        for (i, v) in split.x.iter_mut().enumerate() {
            let c = i % cols;
            let raw = if v.is_nan() { self.mean[c] } else { *v };
            *v = (raw - self.mean[c]) / self.std[c];
        }
    }
}

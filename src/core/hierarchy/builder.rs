//! # 계층 행렬 빌더
//!
//! 분류 체계(간선 목록, 밀집 행렬 파일, 루트→리프 경로)를 정규 방향의 인접 행렬로 바꾼다.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array1, Array2, Ix2};
use serde::{Deserialize, Serialize};

use super::closure::Adjacency;
use super::npy::read_npy;
use crate::core::error::{HmcError, Result};

/// 입력 행렬의 간선 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    /// `A[i][j] = 1` 이면 i가 j의 부모 (정규 방향)
    ParentToChild,
    /// `A[i][j] = 1` 이면 j가 i의 부모
    ChildToParent,
}

impl Default for Orientation {
    fn default() -> Self {
        Self::ParentToChild
    }
}

/// 밀집 `.npy` 인접 행렬 로드
pub fn load_adjacency(path: impl AsRef<Path>, orientation: Orientation) -> Result<Adjacency> {
    let path = path.as_ref();
    let array = read_npy(path)?;
    let matrix = array
        .to_bool()
        .into_dimensionality::<Ix2>()
        .map_err(|_| HmcError::Npy {
            path: path.to_path_buf(),
            reason: format!("expected a 2-D matrix, got shape {:?}", array.shape()),
        })?;
    let adjacency = Adjacency::new(matrix)?;
    log::info!(
        "📂 계층 행렬 로드: {} ({}개 노드, {:?})",
        path.display(),
        adjacency.len(),
        orientation
    );
    Ok(match orientation {
        Orientation::ParentToChild => adjacency,
        Orientation::ChildToParent => adjacency.transposed(),
    })
}

/// 루트→리프 경로 목록으로 만든 분류 체계
#[derive(Debug, Clone)]
pub struct Taxonomy {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    adjacency: Adjacency,
}

impl Taxonomy {
    /// 각 경로에서 앞선 레이블은 뒤따르는 모든 레이블의 조상이다.
    /// 레이블 인덱스는 깊이 순, 같은 깊이에서는 처음 등장한 순서다. 빈 문자열은 건너뛴다.
    pub fn from_paths<S: AsRef<str>>(paths: &[Vec<S>]) -> Result<Self> {
        let max_depth = paths.iter().map(Vec::len).max().unwrap_or(0);
        let mut labels = Vec::new();
        let mut index = HashMap::new();
        for depth in 0..max_depth {
            for path in paths {
                if let Some(label) = path.get(depth).map(AsRef::as_ref) {
                    if !label.is_empty() && !index.contains_key(label) {
                        index.insert(label.to_string(), labels.len());
                        labels.push(label.to_string());
                    }
                }
            }
        }

        let n = labels.len();
        let mut matrix = Array2::from_elem((n, n), false);
        for path in paths {
            let ids: Vec<usize> = path
                .iter()
                .map(AsRef::as_ref)
                .filter(|l| !l.is_empty())
                .map(|l| index[l])
                .collect();
            for pair in ids.windows(2) {
                if pair[0] != pair[1] {
                    matrix[[pair[0], pair[1]]] = true;
                }
            }
        }

        Ok(Self {
            labels,
            index,
            adjacency: Adjacency::new(matrix)?,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    /// 경로 위 모든 레이블을 켠 레이블 벡터
    pub fn label_vector<S: AsRef<str>>(&self, path: &[S]) -> Result<Array1<bool>> {
        let mut y = Array1::from_elem(self.labels.len(), false);
        for label in path.iter().map(AsRef::as_ref).filter(|l| !l.is_empty()) {
            let i = self
                .label_index(label)
                .ok_or_else(|| HmcError::Config(format!("unknown taxonomy label '{}'", label)))?;
            y[i] = true;
        }
        Ok(y)
    }
}

//! # 조상 폐포 변환
//!
//! 정규 규약: `R[i][j] = 1` 이면 i는 j의 조상이거나 j 자신이다.
//! 투영 레이어는 R의 열을, 회로 컴파일러는 `ancestors_of`를 읽는다.

use std::collections::VecDeque;

use candle_core::{Device, Tensor};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::core::error::{HmcError, Result};

/// 직접 간선 행렬 A. `A[i][j] = 1` 이면 i가 j의 부모다.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjacency {
    matrix: Array2<bool>,
}

impl Adjacency {
    pub fn new(matrix: Array2<bool>) -> Result<Self> {
        let (rows, cols) = matrix.dim();
        if rows != cols {
            return Err(HmcError::NotSquare { rows, cols });
        }
        if rows == 0 {
            return Err(HmcError::EmptyHierarchy);
        }
        Ok(Self { matrix })
    }

    /// `(parent, child)` 간선 목록에서 생성
    pub fn from_edges(n: usize, edges: &[(usize, usize)]) -> Result<Self> {
        let mut matrix = Array2::from_elem((n, n), false);
        for &(parent, child) in edges {
            if parent >= n || child >= n {
                return Err(HmcError::ShapeMismatch(format!(
                    "edge ({}, {}) out of range for {} nodes",
                    parent, child, n
                )));
            }
            matrix[[parent, child]] = true;
        }
        Self::new(matrix)
    }

    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn matrix(&self) -> &Array2<bool> {
        &self.matrix
    }

    /// 자식→부모 방향으로 저장된 입력을 정규 방향으로 뒤집는다
    pub fn transposed(&self) -> Self {
        Self {
            matrix: self.matrix.t().to_owned(),
        }
    }

    fn children_lists(&self) -> Vec<Vec<usize>> {
        let n = self.len();
        let self_loops = (0..n).filter(|&i| self.matrix[[i, i]]).count();
        let lists = (0..n)
            .map(|i| (0..n).filter(|&j| i != j && self.matrix[[i, j]]).collect())
            .collect();
        if self_loops > 0 {
            log::warn!("인접 행렬 대각선의 자기 간선 {}개는 무시합니다", self_loops);
        }
        lists
    }
}

/// Kahn 알고리즘으로 사이클 검출
fn check_acyclic(children: &[Vec<usize>]) -> Result<()> {
    let n = children.len();
    let mut in_degree = vec![0usize; n];
    for list in children {
        for &c in list {
            in_degree[c] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0usize;
    while let Some(i) = queue.pop_front() {
        visited += 1;
        for &c in &children[i] {
            in_degree[c] -= 1;
            if in_degree[c] == 0 {
                queue.push_back(c);
            }
        }
    }

    if visited < n {
        let node = (0..n).find(|&i| in_degree[i] > 0).unwrap_or(0);
        return Err(HmcError::Cycle { node });
    }
    Ok(())
}

fn reachable_from(start: usize, children: &[Vec<usize>]) -> Vec<usize> {
    let mut seen = vec![false; children.len()];
    let mut stack = vec![start];
    let mut out = Vec::new();
    seen[start] = true;
    while let Some(i) = stack.pop() {
        for &c in &children[i] {
            if !seen[c] {
                seen[c] = true;
                out.push(c);
                stack.push(c);
            }
        }
    }
    out.sort_unstable();
    out
}

/// 반사-추이 폐포 R과 노드별 조상/자손 목록
#[derive(Debug, Clone)]
pub struct AncestorMatrix {
    r: Array2<bool>,
    ancestors: Vec<Vec<usize>>,
    descendants: Vec<Vec<usize>>,
}

impl AncestorMatrix {
    pub fn from_adjacency(adjacency: &Adjacency) -> Result<Self> {
        let n = adjacency.len();
        let children = adjacency.children_lists();
        check_acyclic(&children)?;

        // 노드별 도달 가능 집합은 서로 독립이므로 병렬 계산
        let descendants: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|i| reachable_from(i, &children))
            .collect();

        let mut r = Array2::from_elem((n, n), false);
        let mut ancestors = vec![Vec::new(); n];
        for (i, desc) in descendants.iter().enumerate() {
            r[[i, i]] = true;
            for &j in desc {
                r[[i, j]] = true;
                ancestors[j].push(i);
            }
        }

        Ok(Self {
            r,
            ancestors,
            descendants,
        })
    }

    /// 제약 없는 계층 (대각선만 1)
    pub fn identity(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(HmcError::EmptyHierarchy);
        }
        Ok(Self {
            r: Array2::from_shape_fn((n, n), |(i, j)| i == j),
            ancestors: vec![Vec::new(); n],
            descendants: vec![Vec::new(); n],
        })
    }

    pub fn len(&self) -> usize {
        self.r.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    pub fn matrix(&self) -> &Array2<bool> {
        &self.r
    }

    pub fn is_ancestor(&self, i: usize, j: usize) -> bool {
        self.r[[i, j]]
    }

    /// j의 진조상 (자기 자신 제외, 오름차순)
    pub fn ancestors_of(&self, j: usize) -> &[usize] {
        &self.ancestors[j]
    }

    /// i의 진자손 (자기 자신 제외, 오름차순)
    pub fn descendants_of(&self, i: usize) -> &[usize] {
        &self.descendants[i]
    }

    pub fn depth(&self, i: usize) -> usize {
        self.ancestors[i].len()
    }

    /// 자손 규약 행렬 (`T[i][j] = 1` 이면 i가 j의 자손). 정규 규약이 아니다.
    pub fn transposed(&self) -> Array2<bool> {
        self.r.t().to_owned()
    }

    pub fn is_consistent(&self, labels: ArrayView1<bool>) -> bool {
        self.first_violation(labels).is_none()
    }

    fn first_violation(&self, labels: ArrayView1<bool>) -> Option<(usize, usize)> {
        labels
            .iter()
            .enumerate()
            .filter(|(_, &on)| on)
            .find_map(|(j, _)| {
                self.ancestors[j]
                    .iter()
                    .find(|&&i| !labels[i])
                    .map(|&i| (j, i))
            })
    }

    /// 모든 행이 계층을 만족하는지 검사
    pub fn check_labels(&self, labels: ArrayView2<bool>) -> Result<()> {
        if labels.ncols() != self.len() {
            return Err(HmcError::ShapeMismatch(format!(
                "labels have {} columns, hierarchy has {} nodes",
                labels.ncols(),
                self.len()
            )));
        }
        let violation = labels
            .outer_iter()
            .enumerate()
            .par_bridge()
            .find_map_any(|(row, y)| self.first_violation(y).map(|v| (row, v)));
        match violation {
            Some((row, (node, ancestor))) => Err(HmcError::InconsistentLabels {
                row,
                node,
                ancestor,
            }),
            None => Ok(()),
        }
    }

    /// 캐시 키로 쓰는 SHA-256 (노드 수 + 행 우선 비트)
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.len() as u64).to_le_bytes());
        let bytes: Vec<u8> = self.r.iter().map(|&b| b as u8).collect();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }

    /// (N, N) u8 마스크 텐서
    pub fn to_mask_tensor(&self, device: &Device) -> Result<Tensor> {
        let n = self.len();
        let data: Vec<u8> = self.r.iter().map(|&b| b as u8).collect();
        Ok(Tensor::from_vec(data, (n, n), device)?)
    }
}

//! # 컴파일된 회로
//!
//! 컴파일 후 구조가 바뀌지 않는 읽기 전용 값.
//! 노드는 자식이 부모보다 먼저 오도록 저장된다.

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::core::hierarchy::AncestorMatrix;

/// 결정 노드의 가지 대상
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Child {
    False,
    True,
    Node(u32),
}

impl Child {
    pub fn is_false(self) -> bool {
        matches!(self, Child::False)
    }
}

/// level의 변수를 검사해 0이면 `lo`, 1이면 `hi` 로 간다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionNode {
    pub level: u32,
    pub lo: Child,
    pub hi: Child,
}

impl DecisionNode {
    /// 두 가지가 모두 만족 가능하면 파라미터를 갖는다
    pub fn is_free(&self) -> bool {
        !self.lo.is_false() && !self.hi.is_false()
    }
}

/// 직렬화 형태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitParts {
    pub num_vars: usize,
    pub order: Vec<usize>,
    pub nodes: Vec<DecisionNode>,
    pub root: Child,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CircuitParts", into = "CircuitParts")]
pub struct Circuit {
    parts: CircuitParts,
    /// 노드 → 자유 노드 번호
    free_index: Vec<Option<u32>>,
    num_free: usize,
}

impl TryFrom<CircuitParts> for Circuit {
    type Error = String;

    /// 구조 검증: 순서는 순열, 자식은 바로 아래 level, 루트는 level 0
    fn try_from(parts: CircuitParts) -> Result<Self, String> {
        let n = parts.num_vars;
        if n == 0 {
            return Err("circuit has no variables".into());
        }
        if parts.order.len() != n {
            return Err(format!(
                "variable order has {} entries for {} variables",
                parts.order.len(),
                n
            ));
        }
        let mut seen = vec![false; n];
        for &v in &parts.order {
            if v >= n || seen[v] {
                return Err(format!("variable order is not a permutation (entry {})", v));
            }
            seen[v] = true;
        }

        let check_child = |index: usize, level: u32, child: Child| -> Result<(), String> {
            match child {
                Child::False => Ok(()),
                Child::True if level as usize + 1 == n => Ok(()),
                Child::True => Err(format!("node {} reaches ⊤ before the last level", index)),
                Child::Node(c) => {
                    let c = c as usize;
                    if c >= index {
                        return Err(format!("node {} points forward to node {}", index, c));
                    }
                    if parts.nodes[c].level != level + 1 {
                        return Err(format!("node {} skips a level", index));
                    }
                    Ok(())
                }
            }
        };

        let mut free_index = Vec::with_capacity(parts.nodes.len());
        let mut num_free = 0usize;
        for (index, node) in parts.nodes.iter().enumerate() {
            if node.level as usize >= n {
                return Err(format!("node {} has level {} >= {}", index, node.level, n));
            }
            if node.lo.is_false() && node.hi.is_false() {
                return Err(format!("node {} has two ⊥ branches", index));
            }
            check_child(index, node.level, node.lo)?;
            check_child(index, node.level, node.hi)?;
            if node.is_free() {
                free_index.push(Some(num_free as u32));
                num_free += 1;
            } else {
                free_index.push(None);
            }
        }

        match parts.root {
            Child::Node(r) if r as usize + 1 == parts.nodes.len() && parts.nodes[r as usize].level == 0 => {}
            _ => return Err("root must be the last node and sit at level 0".into()),
        }

        Ok(Self {
            parts,
            free_index,
            num_free,
        })
    }
}

impl From<Circuit> for CircuitParts {
    fn from(circuit: Circuit) -> Self {
        circuit.parts
    }
}

impl Circuit {
    pub fn num_vars(&self) -> usize {
        self.parts.num_vars
    }

    /// level → 변수 (vtree)
    pub fn order(&self) -> &[usize] {
        &self.parts.order
    }

    pub fn nodes(&self) -> &[DecisionNode] {
        &self.parts.nodes
    }

    pub fn root(&self) -> Child {
        self.parts.root
    }

    pub fn node_count(&self) -> usize {
        self.parts.nodes.len()
    }

    /// 자유 노드 수 (β)
    pub fn num_free(&self) -> usize {
        self.num_free
    }

    pub fn free_index(&self, node: usize) -> Option<usize> {
        self.free_index[node].map(|f| f as usize)
    }

    /// level별 노드 수의 최댓값
    pub fn width(&self) -> usize {
        let mut per_level = vec![0usize; self.num_vars()];
        for node in self.nodes() {
            per_level[node.level as usize] += 1;
        }
        per_level.into_iter().max().unwrap_or(0)
    }

    /// 할당이 회로를 만족하는지 (모델 검사)
    pub fn evaluate(&self, assignment: ArrayView1<bool>) -> bool {
        let mut current = self.root();
        loop {
            match current {
                Child::False => return false,
                Child::True => return true,
                Child::Node(i) => {
                    let node = &self.parts.nodes[i as usize];
                    let var = self.parts.order[node.level as usize];
                    current = if assignment[var] { node.hi } else { node.lo };
                }
            }
        }
    }

    /// 만족 할당의 개수
    pub fn model_count(&self) -> f64 {
        let value = |child: Child, counts: &[f64]| match child {
            Child::False => 0.0,
            Child::True => 1.0,
            Child::Node(i) => counts[i as usize],
        };
        let mut counts = Vec::with_capacity(self.node_count());
        for node in self.nodes() {
            let c = value(node.lo, &counts) + value(node.hi, &counts);
            counts.push(c);
        }
        value(self.root(), &counts)
    }

    /// 레이블 경로가 지나는 자유 노드와 선택한 가지.
    /// ⊥에 닿으면 그때 검사한 변수를 `Err`로 돌려준다.
    pub fn path(&self, labels: ArrayView1<bool>) -> Result<Vec<(usize, bool)>, usize> {
        let mut steps = Vec::new();
        let Child::Node(mut i) = self.root() else {
            return Ok(steps);
        };
        loop {
            let node = &self.parts.nodes[i as usize];
            let var = self.parts.order[node.level as usize];
            let on = labels[var];
            if let Some(f) = self.free_index[i as usize] {
                steps.push((f as usize, on));
            }
            match if on { node.hi } else { node.lo } {
                Child::False => return Err(var),
                Child::True => return Ok(steps),
                Child::Node(c) => i = c,
            }
        }
    }

    /// 노드마다 "모든 조상과 함께 켜짐"은 만족하고 "조상 하나 빠짐"은 위반하는지 확인
    pub fn encodes(&self, r: &AncestorMatrix) -> bool {
        let n = self.num_vars();
        if r.len() != n {
            return false;
        }
        (0..n).all(|i| {
            let mut y = ndarray::Array1::from_elem(n, false);
            y[i] = true;
            for &a in r.ancestors_of(i) {
                y[a] = true;
            }
            if !self.evaluate(y.view()) {
                return false;
            }
            r.ancestors_of(i).iter().all(|&a| {
                y[a] = false;
                let rejected = !self.evaluate(y.view());
                y[a] = true;
                rejected
            })
        })
    }
}

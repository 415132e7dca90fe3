//! # 회로 매니저
//!
//! 해시 콘싱된 준축약(quasi-reduced) 순서 결정 다이어그램.
//! 루트에서 출발한 모든 경로는 저장된 순서대로 모든 변수를 한 번씩 검사한다.
//! 두 가지가 모두 ⊥인 노드는 ⊥로 접힌다.

use std::collections::HashMap;

use super::compiled::{Child, Circuit, CircuitParts, DecisionNode};
use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::AncestorMatrix;

/// 매니저 아레나의 노드 식별자
pub type NodeId = u32;

pub const FALSE: NodeId = 0;
pub const TRUE: NodeId = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Decision {
    level: u32,
    lo: NodeId,
    hi: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    And,
    Or,
}

/// 공유 부분 구조를 재사용하는 노드 아레나
#[derive(Debug)]
pub struct Manager {
    /// level → 변수
    order: Vec<usize>,
    /// 변수 → level
    position: Vec<usize>,
    nodes: Vec<Decision>,
    unique: HashMap<Decision, NodeId>,
    /// level별 항진 노드, `tops[n] = TRUE`
    tops: Vec<NodeId>,
    apply_memo: HashMap<(Op, NodeId, NodeId), NodeId>,
    not_memo: HashMap<NodeId, NodeId>,
}

impl Manager {
    pub fn new(order: Vec<usize>) -> Result<Self> {
        let n = order.len();
        if n == 0 {
            return Err(HmcError::EmptyHierarchy);
        }
        let mut position = vec![usize::MAX; n];
        for (level, &var) in order.iter().enumerate() {
            if var >= n || position[var] != usize::MAX {
                return Err(HmcError::Config(format!(
                    "variable order is not a permutation of 0..{}",
                    n
                )));
            }
            position[var] = level;
        }

        // 0, 1번 슬롯은 단말 노드 자리
        let terminal = Decision {
            level: n as u32,
            lo: FALSE,
            hi: FALSE,
        };
        let mut manager = Self {
            order,
            position,
            nodes: vec![terminal, terminal],
            unique: HashMap::new(),
            tops: vec![TRUE; n + 1],
            apply_memo: HashMap::new(),
            not_memo: HashMap::new(),
        };
        for level in (0..n).rev() {
            let below = manager.tops[level + 1];
            manager.tops[level] = manager.mk(level, below, below);
        }
        Ok(manager)
    }

    pub fn num_vars(&self) -> usize {
        self.order.len()
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// 단말 두 개를 제외한 노드 수
    pub fn node_count(&self) -> usize {
        self.nodes.len() - 2
    }

    pub fn true_node(&self) -> NodeId {
        self.tops[0]
    }

    pub fn false_node(&self) -> NodeId {
        FALSE
    }

    fn mk(&mut self, level: usize, lo: NodeId, hi: NodeId) -> NodeId {
        if lo == FALSE && hi == FALSE {
            return FALSE;
        }
        let key = Decision {
            level: level as u32,
            lo,
            hi,
        };
        if let Some(&id) = self.unique.get(&key) {
            return id;
        }
        let id = self.nodes.len() as NodeId;
        self.nodes.push(key);
        self.unique.insert(key, id);
        id
    }

    /// `var` 또는 `¬var`
    pub fn literal(&mut self, var: usize, positive: bool) -> NodeId {
        let p = self.position[var];
        let below = self.tops[p + 1];
        let mut node = if positive {
            self.mk(p, FALSE, below)
        } else {
            self.mk(p, below, FALSE)
        };
        for level in (0..p).rev() {
            node = self.mk(level, node, node);
        }
        node
    }

    pub fn and(&mut self, f: NodeId, g: NodeId) -> NodeId {
        self.apply(Op::And, 0, f, g)
    }

    pub fn or(&mut self, f: NodeId, g: NodeId) -> NodeId {
        self.apply(Op::Or, 0, f, g)
    }

    pub fn not(&mut self, f: NodeId) -> NodeId {
        self.negate(0, f)
    }

    fn apply(&mut self, op: Op, level: usize, f: NodeId, g: NodeId) -> NodeId {
        match op {
            Op::And => {
                if f == FALSE || g == FALSE {
                    return FALSE;
                }
                if f == g || g == self.tops[level] {
                    return f;
                }
                if f == self.tops[level] {
                    return g;
                }
            }
            Op::Or => {
                if f == FALSE || f == g {
                    return g;
                }
                if g == FALSE {
                    return f;
                }
                if f == self.tops[level] || g == self.tops[level] {
                    return self.tops[level];
                }
            }
        }
        // 여기서 level < n 이고 f, g 모두 level의 결정 노드
        let key = (op, f.min(g), f.max(g));
        if let Some(&id) = self.apply_memo.get(&key) {
            return id;
        }
        let (a, b) = (self.nodes[f as usize], self.nodes[g as usize]);
        let lo = self.apply(op, level + 1, a.lo, b.lo);
        let hi = self.apply(op, level + 1, a.hi, b.hi);
        let id = self.mk(level, lo, hi);
        self.apply_memo.insert(key, id);
        id
    }

    fn negate(&mut self, level: usize, f: NodeId) -> NodeId {
        if f == FALSE {
            return self.tops[level];
        }
        if f == self.tops[level] {
            return FALSE;
        }
        if let Some(&id) = self.not_memo.get(&f) {
            return id;
        }
        let node = self.nodes[f as usize];
        let lo = self.negate(level + 1, node.lo);
        let hi = self.negate(level + 1, node.hi);
        let id = self.mk(level, lo, hi);
        self.not_memo.insert(f, id);
        id
    }

    /// 연산 메모만 비운다. 노드는 유지된다.
    pub fn clear_memo(&mut self) {
        self.apply_memo.clear();
        self.not_memo.clear();
    }

    /// 루트에서 도달 가능한 노드만 남겨 자식 우선 순서로 내보낸다
    pub fn export(&self, root: NodeId) -> Result<Circuit> {
        let mut remap: HashMap<NodeId, u32> = HashMap::new();
        let mut nodes = Vec::new();
        let to_child = |id: NodeId, remap: &HashMap<NodeId, u32>| match id {
            FALSE => Child::False,
            TRUE => Child::True,
            other => Child::Node(remap[&other]),
        };

        // 반복 후위 순회
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if id == FALSE || id == TRUE || remap.contains_key(&id) {
                continue;
            }
            let node = self.nodes[id as usize];
            if expanded {
                let index = nodes.len() as u32;
                nodes.push(DecisionNode {
                    level: node.level,
                    lo: to_child(node.lo, &remap),
                    hi: to_child(node.hi, &remap),
                });
                remap.insert(id, index);
            } else {
                stack.push((id, true));
                stack.push((node.hi, false));
                stack.push((node.lo, false));
            }
        }

        let parts = CircuitParts {
            num_vars: self.num_vars(),
            order: self.order.clone(),
            root: to_child(root, &remap),
            nodes,
        };
        Circuit::try_from(parts).map_err(HmcError::Config)
    }
}

/// 조상이 먼저 오는 위상 DFS 순서.
/// 트리 계층에서는 level별 노드 수가 깊이 + 1을 넘지 않는다.
pub fn topological_order(r: &AncestorMatrix) -> Vec<usize> {
    let n = r.len();
    let mut remaining: Vec<usize> = (0..n).map(|j| r.ancestors_of(j).len()).collect();
    let mut stack: Vec<usize> = (0..n).rev().filter(|&j| remaining[j] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(v) = stack.pop() {
        order.push(v);
        let mut ready = Vec::new();
        for &d in r.descendants_of(v) {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.push(d);
            }
        }
        // 작은 인덱스부터 꺼내지도록 역순으로 쌓는다
        stack.extend(ready.into_iter().rev());
    }
    order
}

/// 노드마다 `¬i ∨ AND(ancestors(i))` 를 만들어 모두 곱한다
pub fn compile(r: &AncestorMatrix) -> Result<Circuit> {
    let n = r.len();
    let mut manager = Manager::new(topological_order(r))?;
    let mut alpha = manager.true_node();

    for i in 0..n {
        let mut beta = manager.true_node();
        for &a in r.ancestors_of(i) {
            let lit = manager.literal(a, true);
            beta = manager.and(beta, lit);
        }
        let not_i = manager.literal(i, false);
        let clause = manager.or(not_i, beta);
        alpha = manager.and(alpha, clause);
        manager.clear_memo();

        if (i + 1) % 500 == 0 {
            log::debug!("회로 컴파일 {}/{} (아레나 {}개 노드)", i + 1, n, manager.node_count());
        }
    }

    let circuit = manager.export(alpha)?;
    log::info!(
        "🔧 회로 컴파일 완료: 변수 {}개, 노드 {}개, 자유 노드 {}개, 최대 폭 {}",
        n,
        circuit.node_count(),
        circuit.num_free(),
        circuit.width()
    );
    Ok(circuit)
}

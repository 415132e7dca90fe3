use crate::core::circuit::{compile, topological_order, Manager};
use crate::core::hierarchy::{Adjacency, AncestorMatrix};
use anyhow::Result;
use ndarray::{array, Array1};

fn chain3() -> AncestorMatrix {
    AncestorMatrix::from_adjacency(&Adjacency::from_edges(3, &[(0, 1), (1, 2)]).unwrap()).unwrap()
}

fn diamond() -> AncestorMatrix {
    let a = Adjacency::from_edges(6, &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4), (5, 4)]).unwrap();
    AncestorMatrix::from_adjacency(&a).unwrap()
}

fn assignment(bits: usize, n: usize) -> Array1<bool> {
    Array1::from_shape_fn(n, |i| bits >> i & 1 == 1)
}

#[test]
fn 체인_회로_모델_검사_테스트() -> Result<()> {
    let circuit = compile(&chain3())?;

    assert!(!circuit.evaluate(array![false, true, true].view()));
    assert!(!circuit.evaluate(array![false, false, true].view()));
    for y in [
        array![true, true, true],
        array![false, false, false],
        array![true, true, false],
        array![true, false, false],
    ] {
        assert!(circuit.evaluate(y.view()), "{:?} 는 만족해야 함", y);
    }
    assert_eq!(circuit.model_count(), 4.0);
    Ok(())
}

#[test]
fn dag_회로_모델은_정확히_일관_할당_테스트() -> Result<()> {
    let r = diamond();
    let circuit = compile(&r)?;
    let n = r.len();

    let mut consistent = 0usize;
    for bits in 0..(1 << n) {
        let y = assignment(bits, n);
        let expected = r.is_consistent(y.view());
        assert_eq!(circuit.evaluate(y.view()), expected, "할당 {:06b}", bits);
        consistent += expected as usize;
    }
    assert_eq!(circuit.model_count(), consistent as f64);
    assert!(circuit.encodes(&r));
    Ok(())
}

#[test]
fn 항등_계층은_완전_분해_테스트() -> Result<()> {
    let circuit = compile(&AncestorMatrix::identity(5)?)?;
    assert_eq!(circuit.model_count(), 32.0);
    // 변수마다 노드 하나, 모두 자유 노드
    assert_eq!(circuit.node_count(), 5);
    assert_eq!(circuit.num_free(), 5);
    assert_eq!(circuit.width(), 1);
    Ok(())
}

#[test]
fn 위상_순서는_조상이_먼저_테스트() -> Result<()> {
    let r = diamond();
    let order = topological_order(&r);
    assert_eq!(order.len(), r.len());

    let mut position = vec![0; r.len()];
    for (level, &v) in order.iter().enumerate() {
        position[v] = level;
    }
    for j in 0..r.len() {
        for &a in r.ancestors_of(j) {
            assert!(position[a] < position[j], "{} 는 {} 보다 먼저", a, j);
        }
    }
    Ok(())
}

#[test]
fn 트리_회로_폭은_깊이_이하_테스트() -> Result<()> {
    // 0 → {1, 2}, 1 → {3, 4}, 2 → {5, 6}
    let a = Adjacency::from_edges(7, &[(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (2, 6)])?;
    let r = AncestorMatrix::from_adjacency(&a)?;
    let circuit = compile(&r)?;

    let depth = (0..r.len()).map(|i| r.depth(i)).max().unwrap_or(0);
    assert!(circuit.width() <= depth + 1, "폭 {} 깊이 {}", circuit.width(), depth);
    Ok(())
}

#[test]
fn 매니저_해시콘싱_기본연산_테스트() -> Result<()> {
    let mut manager = Manager::new(vec![0, 1])?;
    let x0 = manager.literal(0, true);
    let x1 = manager.literal(1, true);

    // 같은 구조는 같은 노드
    assert_eq!(manager.literal(0, true), x0);
    let both = manager.and(x0, x1);
    assert_eq!(manager.and(x1, x0), both);

    // x0 ∧ ¬x0 = ⊥, x0 ∨ ¬x0 = ⊤
    let not_x0 = manager.not(x0);
    assert_eq!(manager.and(x0, not_x0), manager.false_node());
    assert_eq!(manager.or(x0, not_x0), manager.true_node());

    // 드모르간
    let not_both = manager.not(both);
    let not_x1 = manager.not(x1);
    assert_eq!(manager.or(not_x0, not_x1), not_both);

    let circuit = manager.export(both)?;
    assert_eq!(circuit.model_count(), 1.0);

    assert!(Manager::new(vec![0, 0]).is_err());
    Ok(())
}

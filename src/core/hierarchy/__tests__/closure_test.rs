use crate::core::error::HmcError;
use crate::core::hierarchy::{Adjacency, AncestorMatrix};
use anyhow::Result;
use ndarray::{array, Array2};

fn chain3() -> Adjacency {
    Adjacency::from_edges(3, &[(0, 1), (1, 2)]).unwrap()
}

/// 0 → {1, 2}, 1 → {3, 4}, 2 → 5
fn small_tree() -> Adjacency {
    Adjacency::from_edges(6, &[(0, 1), (0, 2), (1, 3), (1, 4), (2, 5)]).unwrap()
}

#[test]
fn 체인_폐포_상삼각_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&chain3())?;
    let expected = array![
        [true, true, true],
        [false, true, true],
        [false, false, true]
    ];
    assert_eq!(r.matrix(), &expected);
    assert_eq!(r.ancestors_of(2), &[0, 1]);
    assert_eq!(r.descendants_of(0), &[1, 2]);
    assert_eq!(r.depth(2), 2);
    Ok(())
}

#[test]
fn 폐포_반사성_추이성_테스트() -> Result<()> {
    // 다이아몬드 + 꼬리: 여러 부모를 갖는 DAG
    let a = Adjacency::from_edges(6, &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4), (5, 4)])?;
    let r = AncestorMatrix::from_adjacency(&a)?;
    let n = r.len();

    for i in 0..n {
        assert!(r.is_ancestor(i, i), "대각선은 항상 1");
    }
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                if r.is_ancestor(i, j) && r.is_ancestor(j, k) {
                    assert!(r.is_ancestor(i, k), "추이성 위반: {} {} {}", i, j, k);
                }
            }
        }
    }
    assert_eq!(r.ancestors_of(4), &[0, 1, 2, 3, 5]);
    assert!(!r.is_ancestor(5, 3));
    Ok(())
}

#[test]
fn 사이클_검출_테스트() {
    let a = Adjacency::from_edges(3, &[(0, 1), (1, 2), (2, 0)]).unwrap();
    match AncestorMatrix::from_adjacency(&a) {
        Err(HmcError::Cycle { .. }) => {}
        other => panic!("사이클이 검출되어야 함: {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn 자기간선_무시_테스트() -> Result<()> {
    let mut m = Array2::from_elem((2, 2), false);
    m[[0, 0]] = true;
    m[[0, 1]] = true;
    let r = AncestorMatrix::from_adjacency(&Adjacency::new(m)?)?;
    assert!(r.is_ancestor(0, 1));
    assert!(!r.is_ancestor(1, 0));
    Ok(())
}

#[test]
fn 정사각_아닌_행렬_거부_테스트() {
    let m = Array2::from_elem((2, 3), false);
    assert!(matches!(
        Adjacency::new(m),
        Err(HmcError::NotSquare { rows: 2, cols: 3 })
    ));
    assert!(matches!(
        Adjacency::new(Array2::from_elem((0, 0), false)),
        Err(HmcError::EmptyHierarchy)
    ));
}

#[test]
fn 레이블_일관성_검사_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&small_tree())?;

    let good = array![
        [true, true, false, true, false, false],
        [false, false, false, false, false, false],
        [true, false, true, false, false, true]
    ];
    r.check_labels(good.view())?;

    let bad = array![
        [true, true, false, true, false, false],
        [true, false, false, false, true, false]
    ];
    match r.check_labels(bad.view()) {
        Err(HmcError::InconsistentLabels { row, node, ancestor }) => {
            assert_eq!((row, node, ancestor), (1, 4, 1));
        }
        other => panic!("불일치가 검출되어야 함: {:?}", other),
    }

    let narrow = Array2::from_elem((1, 3), false);
    assert!(matches!(
        r.check_labels(narrow.view()),
        Err(HmcError::ShapeMismatch(_))
    ));
    Ok(())
}

#[test]
fn 항등_계층_테스트() -> Result<()> {
    let r = AncestorMatrix::identity(4)?;
    assert_eq!(r.len(), 4);
    assert!(r.ancestors_of(3).is_empty());
    assert!(r.is_consistent(array![false, true, false, true].view()));
    Ok(())
}

#[test]
fn 내용_해시_구분_테스트() -> Result<()> {
    let chain = AncestorMatrix::from_adjacency(&chain3())?;
    let same = AncestorMatrix::from_adjacency(&Adjacency::from_edges(3, &[(0, 1), (1, 2), (0, 2)])?)?;
    let flat = AncestorMatrix::identity(3)?;

    // 같은 폐포면 같은 해시, 다른 계층이면 다른 해시
    assert_eq!(chain.content_hash(), same.content_hash());
    assert_ne!(chain.content_hash(), flat.content_hash());
    assert_eq!(chain.content_hash().len(), 64);
    Ok(())
}

#[test]
fn 전치_행렬은_자손_규약_테스트() -> Result<()> {
    let r = AncestorMatrix::from_adjacency(&chain3())?;
    let t = r.transposed();
    assert!(t[[2, 0]]);
    assert!(!t[[0, 2]]);
    Ok(())
}

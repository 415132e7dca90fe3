use std::path::PathBuf;
use std::process;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use hmc_circuit::core::circuit::CircuitStore;
use hmc_circuit::core::hierarchy::{load_adjacency, AncestorMatrix, Orientation};

fn run() -> Result<()> {
    let matches = Command::new("compile_circuit")
        .version("0.1.0")
        .about("계층 행렬(.npy)의 제약 회로를 미리 컴파일해 캐시에 저장")
        .arg(
            Arg::new("hierarchy")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("계층 인접 행렬 .npy 파일"),
        )
        .arg(
            Arg::new("dataset")
                .long("dataset")
                .value_name("NAME")
                .required(true)
                .help("캐시 키에 쓰이는 데이터셋 이름"),
        )
        .arg(
            Arg::new("orientation")
                .long("orientation")
                .value_name("DIR")
                .value_parser(value_parser!(Orientation))
                .default_value("parent-to-child")
                .help("간선 방향"),
        )
        .arg(
            Arg::new("constraints-dir")
                .long("constraints-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .default_value("constraints")
                .help("회로 캐시 디렉토리"),
        )
        .get_matches();

    let hierarchy = matches
        .get_one::<PathBuf>("hierarchy")
        .context("계층 파일 경로가 필요합니다")?;
    let dataset = matches
        .get_one::<String>("dataset")
        .context("데이터셋 이름이 필요합니다")?;
    let orientation = matches
        .get_one::<Orientation>("orientation")
        .copied()
        .unwrap_or_default();
    let store = CircuitStore::new(
        matches
            .get_one::<PathBuf>("constraints-dir")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("constraints")),
    );

    let adjacency = load_adjacency(hierarchy, orientation)
        .with_context(|| format!("{} 로드 실패", hierarchy.display()))?;
    let r = AncestorMatrix::from_adjacency(&adjacency)?;
    let key = CircuitStore::key(dataset, &r);

    println!("🔧 회로 컴파일: {} (노드 {}개)", hierarchy.display(), r.len());
    let started = Instant::now();
    let circuit = store
        .load_or_compile(dataset, &r)
        .with_context(|| format!("{} 회로 준비 실패", key))?;
    let (circuit_path, vtree_path) = store.paths(&key);

    println!("✅ 완료 ({:.2}초)", started.elapsed().as_secs_f64());
    println!("   키: {}", key);
    println!("   결정 노드: {}", circuit.node_count());
    println!("   자유 노드: {}", circuit.num_free());
    println!("   최대 폭: {}", circuit.width());
    println!("   일관 할당 수: {:e}", circuit.model_count());
    println!("   회로: {}", circuit_path.display());
    println!("   변수 순서: {}", vtree_path.display());
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("❌ 오류: {:#}", e);
        process::exit(1);
    }
}

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use hmc_circuit::core::hierarchy::Orientation;
use hmc_circuit::nn::NonLinearity;
use hmc_circuit::training::{run, RunConfig};

fn cli() -> Command {
    Command::new("hmc_train")
        .version("0.1.0")
        .about("계층 제약 회로로 다중 레이블 분류기 학습")
        .arg(
            Arg::new("dataset")
                .long("dataset")
                .value_name("NAME")
                .required(true)
                .help("<data>_<FUN|GO|others> 형식의 데이터셋 이름"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .conflicts_with("synthetic")
                .help("{train,valid,test}_{x,y}.npy, hierarchy.npy, to_eval.npy 디렉토리"),
        )
        .arg(
            Arg::new("synthetic")
                .long("synthetic")
                .value_name("LABELS")
                .value_parser(value_parser!(usize))
                .help("합성 데이터 레이블 수"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .value_parser(value_parser!(u64))
                .help("난수 시드 (기본 1337)"),
        )
        .arg(
            Arg::new("device")
                .long("device")
                .value_name("DEVICE")
                .help("cpu, cuda, cuda:N 또는 GPU 번호 (기본 cpu)"),
        )
        .arg(usize_arg("emb-size", "임베딩 크기 (기본 128)"))
        .arg(usize_arg("batch-size", "배치 크기 (기본 100)"))
        .arg(f64_arg("lr", "학습률 (기본 1e-4)"))
        .arg(f64_arg("wd", "가중치 감쇠 (기본 1e-5)"))
        .arg(usize_arg("n-epochs", "에포크 수 (기본 200)"))
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("출력 루트 디렉토리 (기본 exp)"),
        )
        .arg(
            Arg::new("exp-id")
                .long("exp-id")
                .value_name("ID")
                .help("실험 디렉토리 이름"),
        )
        .arg(
            Arg::new("no-constraints")
                .long("no-constraints")
                .action(ArgAction::SetTrue)
                .help("완전 분해 분포 사용"),
        )
        .arg(usize_arg("gates", "게이트 은닉층 수 (기본 1)"))
        .arg(usize_arg("gate-hidden", "게이트 은닉층 폭 (기본 256)"))
        .arg(usize_arg("S", "과매개변수화 정도 (기본 0)"))
        .arg(usize_arg("num-reps", "앙상블 복사본 수 (기본 1)"))
        .arg(
            Arg::new("constraints-dir")
                .long("constraints-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("회로 캐시 디렉토리 (기본 constraints)"),
        )
        .arg(usize_arg("eval-every", "K 에포크마다 평가 (기본 5)"))
        .arg(usize_arg("hidden-dim", "백본 은닉층 폭 (기본은 데이터셋 표)"))
        .arg(usize_arg("num-layers", "백본 층 수 (기본 3)"))
        .arg(
            Arg::new("dropout")
                .long("dropout")
                .value_name("P")
                .value_parser(value_parser!(f32))
                .help("드롭아웃 비율 (기본 0.7)"),
        )
        .arg(
            Arg::new("non-lin")
                .long("non-lin")
                .value_name("FN")
                .value_parser(value_parser!(NonLinearity))
                .help("활성화 함수 (기본 relu)"),
        )
        .arg(
            Arg::new("orientation")
                .long("orientation")
                .value_name("DIR")
                .value_parser(value_parser!(Orientation))
                .help("hierarchy.npy 간선 방향 (기본 parent-to-child)"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue)
                .help("진행 막대 숨김"),
        )
}

fn usize_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("N")
        .value_parser(value_parser!(usize))
        .help(help)
}

fn f64_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_name("X")
        .value_parser(value_parser!(f64))
        .help(help)
}

fn config_from(matches: &ArgMatches) -> RunConfig {
    let defaults = RunConfig::default();
    let usize_or = |name: &str, default: usize| matches.get_one::<usize>(name).copied().unwrap_or(default);
    let f64_or = |name: &str, default: f64| matches.get_one::<f64>(name).copied().unwrap_or(default);

    RunConfig {
        dataset: matches.get_one::<String>("dataset").cloned().unwrap_or_default(),
        data_dir: matches.get_one::<PathBuf>("data-dir").cloned(),
        synthetic: matches.get_one::<usize>("synthetic").copied(),
        seed: matches.get_one::<u64>("seed").copied().unwrap_or(defaults.seed),
        device: matches.get_one::<String>("device").cloned().unwrap_or(defaults.device),
        emb_size: usize_or("emb-size", defaults.emb_size),
        batch_size: usize_or("batch-size", defaults.batch_size),
        lr: f64_or("lr", defaults.lr),
        wd: f64_or("wd", defaults.wd),
        n_epochs: usize_or("n-epochs", defaults.n_epochs),
        output: matches.get_one::<PathBuf>("output").cloned().unwrap_or(defaults.output),
        exp_id: matches.get_one::<String>("exp-id").cloned(),
        no_constraints: matches.get_flag("no-constraints"),
        gates: usize_or("gates", defaults.gates),
        gate_hidden: usize_or("gate-hidden", defaults.gate_hidden),
        s: usize_or("S", defaults.s),
        num_reps: usize_or("num-reps", defaults.num_reps),
        constraints_dir: matches
            .get_one::<PathBuf>("constraints-dir")
            .cloned()
            .unwrap_or(defaults.constraints_dir),
        eval_every: usize_or("eval-every", defaults.eval_every),
        hidden_dim: matches.get_one::<usize>("hidden-dim").copied(),
        num_layers: usize_or("num-layers", defaults.num_layers),
        dropout: matches.get_one::<f32>("dropout").copied().unwrap_or(defaults.dropout),
        non_lin: matches.get_one::<NonLinearity>("non-lin").copied().unwrap_or(defaults.non_lin),
        orientation: matches
            .get_one::<Orientation>("orientation")
            .copied()
            .unwrap_or(defaults.orientation),
        quiet: matches.get_flag("quiet"),
    }
}

fn run_cli() -> Result<()> {
    let matches = cli().get_matches();
    let config = config_from(&matches);

    println!("🚀 학습 시작: {}", config.dataset);
    println!("   배치: {}, 학습률: {}, 에포크: {}", config.batch_size, config.lr, config.n_epochs);
    println!("   게이트: {}, S: {}, 복사본: {}", config.gates, config.s, config.num_reps);

    let dataset = config.dataset.clone();
    let summaries = run(config).with_context(|| format!("{} 학습 실패", dataset))?;

    if let Some(test) = summaries.last().and_then(|s| s.test) {
        println!("\n🏆 최종 평가 (test)");
        println!("   Accuracy: {:.4}", test.accuracy);
        println!("   Hamming Loss: {:.4}", test.hamming);
        println!("   Jaccard Score: {:.4}", test.jaccard);
        println!("   nll: {:.4}", test.nll);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run_cli() {
        eprintln!("❌ 오류: {:#}", e);
        process::exit(1);
    }
}

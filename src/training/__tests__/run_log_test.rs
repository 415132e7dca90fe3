use crate::training::{read_scalars, RunConfig, RunLog};
use anyhow::Result;

#[test]
fn 실행_로그_기록_테스트() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = RunConfig {
        dataset: "enron_others".into(),
        ..Default::default()
    };
    let run_dir = dir.path().join("run");

    let mut log = RunLog::create(&run_dir, &config)?;
    log.add_scalars(
        &[("param_sdd/test/accuracy".to_string(), 0.25), ("param_sdd/test/nll".to_string(), 3.5)],
        5,
        0.125,
    )?;
    log.add_scalar("train/loss", 1.0, 6, 2.5)?;
    log.flush()?;

    let args: RunConfig = serde_json::from_str(&std::fs::read_to_string(run_dir.join("args.json"))?)?;
    assert_eq!(args, config);

    let records = read_scalars(log.scalars_path())?;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].name, "param_sdd/test/accuracy");
    assert_eq!(records[0].epoch, 5);
    // walltime은 측정 구간의 경과 시간
    assert_eq!(records[0].walltime, 0.125);
    assert_eq!(records[1].walltime, 0.125);
    assert_eq!(records[2].value, 1.0);
    assert_eq!(records[2].walltime, 2.5);
    Ok(())
}

#[test]
fn 같은_디렉터리_재실행은_기록을_새로_시작_테스트() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = RunConfig::default();

    let mut first = RunLog::create(dir.path(), &config)?;
    first.add_scalar("train/loss", 9.0, 0, 1.0)?;
    first.flush()?;
    drop(first);

    let mut second = RunLog::create(dir.path(), &config)?;
    second.add_scalar("train/loss", 4.0, 0, 1.0)?;
    second.flush()?;

    let records = read_scalars(second.scalars_path())?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].value, 4.0);
    Ok(())
}

//! # 실행 산출물
//!
//! `args.json` (실행 설정) + `runs/scalars.jsonl` (한 줄에 스칼라 하나).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::RunConfig;
use crate::core::error::Result;

/// 스칼라 로그 한 줄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub name: String,
    pub value: f64,
    pub epoch: usize,
    /// 값을 만든 구간의 경과 시간 (초)
    pub walltime: f64,
}

#[derive(Debug)]
pub struct RunLog {
    dir: PathBuf,
    scalars: BufWriter<File>,
}

impl RunLog {
    /// 출력 디렉터리를 만들고 `args.json`을 기록한다
    pub fn create(dir: impl Into<PathBuf>, config: &RunConfig) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("runs"))?;

        let mut args = BufWriter::new(File::create(dir.join("args.json"))?);
        serde_json::to_writer_pretty(&mut args, config)?;
        args.flush()?;

        // 같은 실험 디렉터리로 다시 실행하면 이전 기록을 지운다
        let scalars = File::create(dir.join("runs").join("scalars.jsonl"))?;
        log::info!("📝 실행 로그: {}", dir.display());
        Ok(Self {
            dir,
            scalars: BufWriter::new(scalars),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scalars_path(&self) -> PathBuf {
        self.dir.join("runs").join("scalars.jsonl")
    }

    pub fn add_scalar(&mut self, name: &str, value: f64, epoch: usize, walltime: f64) -> Result<()> {
        let record = ScalarRecord {
            name: name.to_string(),
            value,
            epoch,
            walltime,
        };
        serde_json::to_writer(&mut self.scalars, &record)?;
        self.scalars.write_all(b"\n")?;
        Ok(())
    }

    pub fn add_scalars(&mut self, scalars: &[(String, f64)], epoch: usize, walltime: f64) -> Result<()> {
        for (name, value) in scalars {
            self.add_scalar(name, *value, epoch, walltime)?;
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.scalars.flush()?;
        Ok(())
    }
}

/// `scalars.jsonl`을 다시 읽는다
pub fn read_scalars(path: impl AsRef<Path>) -> Result<Vec<ScalarRecord>> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

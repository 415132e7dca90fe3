//! # 회로 캐시
//!
//! `"{dataset}-{sha256(R)[..16]}"` 키로 `<key>.circuit`, `<key>.vtree` 두 파일을 둔다.
//! 쓰기는 임시 파일 + rename 이라 동시에 처음 컴파일해도 반쯤 쓰인 파일이 남지 않는다.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::compiled::{Child, Circuit, CircuitParts, DecisionNode};
use super::manager::compile;
use crate::core::error::{HmcError, Result};
use crate::core::hierarchy::AncestorMatrix;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CircuitFile {
    version: u32,
    hierarchy_hash: String,
    num_vars: usize,
    root: Child,
    nodes: Vec<DecisionNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VtreeFile {
    version: u32,
    num_vars: usize,
    order: Vec<usize>,
}

/// 디스크 회로 저장소 (한 번 쓰고 여러 번 읽음)
#[derive(Debug, Clone)]
pub struct CircuitStore {
    dir: PathBuf,
}

impl CircuitStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(dataset: &str, r: &AncestorMatrix) -> String {
        format!("{}-{}", dataset, &r.content_hash()[..16])
    }

    /// (구조 파일, 변수 순서 파일)
    pub fn paths(&self, key: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.join(format!("{}.circuit", key)),
            self.dir.join(format!("{}.vtree", key)),
        )
    }

    pub fn save(&self, key: &str, circuit: &Circuit, r: &AncestorMatrix) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let (circuit_path, vtree_path) = self.paths(key);
        let parts: CircuitParts = circuit.clone().into();

        // 변수 순서 먼저, 구조 파일은 마지막에 이름을 바꾼다

        write_atomic(
            &vtree_path,
            &VtreeFile {
                version: FORMAT_VERSION,
                num_vars: parts.num_vars,
                order: parts.order,
            },
        )?;
        write_atomic(
            &circuit_path,
            &CircuitFile {
                version: FORMAT_VERSION,
                hierarchy_hash: r.content_hash(),
                num_vars: parts.num_vars,
                root: parts.root,
                nodes: parts.nodes,
            },
        )?;
        log::info!("💾 회로 저장: {}", circuit_path.display());
        Ok(())
    }

    /// 캐시가 없으면 `Ok(None)`. 있는데 맞지 않으면 치명적 오류.
    pub fn load(&self, key: &str, r: &AncestorMatrix) -> Result<Option<Circuit>> {
        let (circuit_path, vtree_path) = self.paths(key);
        // 구조 파일이 커밋 표시. 변수 순서 파일만 있으면 다른 프로세스가 아직 쓰는 중이다.
        match (circuit_path.exists(), vtree_path.exists()) {
            (false, _) => return Ok(None),
            (true, true) => {}
            (true, false) => {
                return Err(HmcError::CorruptCache {
                    path: vtree_path,
                    reason: "variable-order file is missing".into(),
                })
            }
        }

        let structure: CircuitFile = read_json(&circuit_path)?;
        let vtree: VtreeFile = read_json(&vtree_path)?;

        for (path, version) in [(&circuit_path, structure.version), (&vtree_path, vtree.version)] {
            if version != FORMAT_VERSION {
                return Err(HmcError::CacheMismatch {
                    path: path.clone(),
                    reason: format!("format version {} (expected {})", version, FORMAT_VERSION),
                });
            }
        }
        for (path, num_vars) in [(&circuit_path, structure.num_vars), (&vtree_path, vtree.num_vars)] {
            if num_vars != r.len() {
                return Err(HmcError::CacheMismatch {
                    path: path.clone(),
                    reason: format!("{} variables cached, hierarchy has {}", num_vars, r.len()),
                });
            }
        }
        if structure.hierarchy_hash != r.content_hash() {
            return Err(HmcError::CacheMismatch {
                path: circuit_path,
                reason: "hierarchy hash differs".into(),
            });
        }

        let circuit = Circuit::try_from(CircuitParts {
            num_vars: structure.num_vars,
            order: vtree.order,
            nodes: structure.nodes,
            root: structure.root,
        })
        .map_err(|reason| HmcError::CorruptCache {
            path: circuit_path.clone(),
            reason,
        })?;

        if !circuit.encodes(r) {
            return Err(HmcError::CacheMismatch {
                path: circuit_path,
                reason: "circuit does not encode the hierarchy".into(),
            });
        }
        log::info!("📦 캐시된 회로 로드: {}", circuit_path.display());
        Ok(Some(circuit))
    }

    pub fn load_or_compile(&self, dataset: &str, r: &AncestorMatrix) -> Result<Circuit> {
        let key = Self::key(dataset, r);
        if let Some(circuit) = self.load(&key, r)? {
            return Ok(circuit);
        }
        let circuit = compile(r)?;
        self.save(&key, &circuit, r)?;
        Ok(circuit)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| HmcError::CorruptCache {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp-{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        std::process::id()
    ));
    {
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

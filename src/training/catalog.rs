//! # 데이터셋 카탈로그
//!
//! `<data>_<ontology>` 이름을 한 번 해석해 입력 종류와 차원 표를 돌려준다.

use serde::{Deserialize, Serialize};

use crate::core::error::{HmcError, Result};
use crate::nn::Modality;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ontology {
    #[serde(rename = "FUN")]
    Fun,
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "others")]
    Others,
}

impl Ontology {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "FUN" => Some(Self::Fun),
            "GO" => Some(Self::Go),
            "others" => Some(Self::Others),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub data: String,
    pub ontology: Ontology,
    pub modality: Modality,
    pub input_dim: Option<usize>,
    pub output_dim: Option<usize>,
    pub hidden_dim: Option<usize>,
}

impl DatasetInfo {
    pub fn resolve(name: &str) -> Result<Self> {
        let (data, ontology) = name
            .rsplit_once('_')
            .and_then(|(data, ont)| Ontology::parse(ont).map(|o| (data, o)))
            .filter(|(data, _)| !data.is_empty())
            .ok_or_else(|| {
                HmcError::Config(format!(
                    "dataset name '{}' must look like <data>_FUN, <data>_GO or <data>_others",
                    name
                ))
            })?;

        let modality = if data == "cub" {
            Modality::Image
        } else {
            Modality::Tabular
        };

        Ok(Self {
            name: name.to_string(),
            data: data.to_string(),
            ontology,
            modality,
            input_dim: input_dim(data),
            output_dim: output_dim(ontology, data),
            hidden_dim: hidden_dim(ontology, data),
        })
    }
}

fn input_dim(data: &str) -> Option<usize> {
    Some(match data {
        "diatoms" => 371,
        "enron" => 1001,
        "imclef07a" | "imclef07d" => 80,
        "cellcycle" => 77,
        "derisi" => 63,
        "eisen" => 79,
        "expr" => 561,
        "gasch1" => 173,
        "gasch2" => 52,
        "seq" => 529,
        "spo" => 86,
        "cub" => 1333,
        _ => return None,
    })
}

fn output_dim(ontology: Ontology, data: &str) -> Option<usize> {
    Some(match (ontology, data) {
        (Ontology::Fun, "eisen") => 461,
        (Ontology::Fun, "cellcycle" | "derisi" | "expr" | "gasch1" | "gasch2" | "seq" | "spo") => 499,
        (Ontology::Go, "cellcycle" | "gasch1") => 4122,
        (Ontology::Go, "derisi" | "spo") => 4116,
        (Ontology::Go, "eisen") => 3570,
        (Ontology::Go, "expr" | "gasch2") => 4128,
        (Ontology::Go, "seq") => 4130,
        (Ontology::Others, "diatoms") => 398,
        (Ontology::Others, "enron") => 56,
        (Ontology::Others, "imclef07a") => 96,
        (Ontology::Others, "imclef07d") => 46,
        (Ontology::Others, "reuters") => 102,
        (Ontology::Others, "cub") => 5,
        _ => return None,
    })
}

fn hidden_dim(ontology: Ontology, data: &str) -> Option<usize> {
    Some(match (ontology, data) {
        (Ontology::Fun, "cellcycle" | "derisi" | "eisen" | "gasch2") => 500,
        (Ontology::Fun, "expr") => 1250,
        (Ontology::Fun, "gasch1") => 1000,
        (Ontology::Fun, "seq") => 2000,
        (Ontology::Fun, "spo") => 250,
        (Ontology::Go, "cellcycle") => 1000,
        (Ontology::Go, "derisi" | "eisen" | "gasch1" | "gasch2" | "spo") => 500,
        (Ontology::Go, "expr") => 4000,
        (Ontology::Go, "seq") => 9000,
        (Ontology::Others, "diatoms") => 2000,
        (Ontology::Others, "enron" | "imclef07a" | "imclef07d" | "cub") => 1000,
        _ => return None,
    })
}

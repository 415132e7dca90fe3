//! NumPy `.npy` 밀집 배열 입출력 (C 순서, 리틀 엔디안만 지원)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};

use crate::core::error::{HmcError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// 지원하는 원소 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    Bool,
    U8,
    I8,
    I32,
    I64,
    F32,
    F64,
}

impl NpyDtype {
    fn parse(descr: &str) -> Option<Self> {
        let (endian, code) = (descr.get(..1)?, descr.get(1..)?);
        if endian == ">" {
            return None;
        }
        match code {
            "b1" => Some(Self::Bool),
            "u1" => Some(Self::U8),
            "i1" => Some(Self::I8),
            "i4" => Some(Self::I32),
            "i8" => Some(Self::I64),
            "f4" => Some(Self::F32),
            "f8" => Some(Self::F64),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Bool | Self::U8 | Self::I8 => 1,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    fn descr(self) -> &'static str {
        match self {
            Self::Bool => "|b1",
            Self::U8 => "|u1",
            Self::I8 => "|i1",
            Self::I32 => "<i4",
            Self::I64 => "<i8",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }
}

/// 읽어 들인 배열. 값은 모두 f64로 확장해서 보관한다.
#[derive(Debug, Clone)]
pub struct NpyArray {
    pub dtype: NpyDtype,
    pub values: ArrayD<f64>,
}

impl NpyArray {
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// 0이 아닌 원소를 참으로 본다
    pub fn to_bool(&self) -> ArrayD<bool> {
        self.values.mapv(|v| v != 0.0)
    }

    pub fn to_f32(&self) -> ArrayD<f32> {
        self.values.mapv(|v| v as f32)
    }
}

fn npy_error(path: &Path, reason: impl Into<String>) -> HmcError {
    HmcError::Npy {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// `.npy` 파일 로드
pub fn read_npy(path: impl AsRef<Path>) -> Result<NpyArray> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let (dtype, shape, preamble) = read_header(path, &mut reader)?;

    // 헤더의 모양을 믿기 전에 실제 파일 길이와 맞춘다
    let payload = shape
        .iter()
        .try_fold(dtype.size(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| npy_error(path, format!("shape {:?} overflows", shape)))?;
    let available = file_len.saturating_sub(preamble as u64);
    if payload as u64 > available {
        return Err(npy_error(
            path,
            format!("shape {:?} needs {} bytes, file has {}", shape, payload, available),
        ));
    }
    let mut buffer = vec![0u8; payload];
    reader.read_exact(&mut buffer)?;

    let values: Vec<f64> = match dtype {
        NpyDtype::Bool | NpyDtype::U8 => buffer.iter().map(|&b| b as f64).collect(),
        NpyDtype::I8 => buffer.iter().map(|&b| b as i8 as f64).collect(),
        NpyDtype::I32 => buffer
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        NpyDtype::F32 => buffer
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        NpyDtype::I64 => buffer
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f64)
            .collect(),
        NpyDtype::F64 => buffer
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    };

    let values = ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| npy_error(path, format!("payload does not match shape: {}", e)))?;
    Ok(NpyArray { dtype, values })
}

/// NumPy 헤더 읽기
/// (원소 타입, 모양, 데이터 앞까지의 바이트 수)
fn read_header(path: &Path, reader: &mut impl Read) -> Result<(NpyDtype, Vec<usize>, usize)> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(npy_error(path, "missing NUMPY magic"));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;

    let (header_len, len_field) = if version[0] == 1 {
        let mut len_bytes = [0u8; 2];
        reader.read_exact(&mut len_bytes)?;
        (u16::from_le_bytes(len_bytes) as usize, 2)
    } else {
        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        (u32::from_le_bytes(len_bytes) as usize, 4)
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let descr = header_value(&header, "descr")
        .and_then(|v| v.split('\'').nth(1).map(str::to_string))
        .ok_or_else(|| npy_error(path, "header has no descr"))?;
    let dtype = NpyDtype::parse(&descr)
        .ok_or_else(|| npy_error(path, format!("unsupported dtype {}", descr)))?;

    if header_value(&header, "fortran_order").map_or(false, |v| v.starts_with("True")) {
        return Err(npy_error(path, "fortran order is not supported"));
    }

    let shape_start = header
        .find('(')
        .ok_or_else(|| npy_error(path, "header has no shape"))?;
    let shape_end = header[shape_start..]
        .find(')')
        .map(|i| shape_start + i)
        .ok_or_else(|| npy_error(path, "unterminated shape"))?;
    let shape = header[shape_start + 1..shape_end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| npy_error(path, format!("bad shape: {}", e)))?;

    Ok((dtype, shape, MAGIC.len() + 2 + len_field + header_len))
}

fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    header
        .find(&pattern)
        .map(|i| header[i + pattern.len()..].trim_start())
}

/// `.npy` 파일 저장 (버전 1.0 헤더)
pub fn write_npy(path: impl AsRef<Path>, values: &ArrayD<f64>, dtype: NpyDtype) -> Result<()> {
    let path = path.as_ref();
    let shape = values.shape();
    let shape_str = match shape.len() {
        1 => format!("({},)", shape[0]),
        _ => format!(
            "({})",
            shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        dtype.descr(),
        shape_str
    );
    // 매직(6) + 버전(2) + 길이(2) + 헤더 + 개행이 64바이트 배수가 되도록 패딩
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(header.as_bytes())?;

    for &v in values.iter() {
        match dtype {
            NpyDtype::Bool => writer.write_all(&[(v != 0.0) as u8])?,
            NpyDtype::U8 => writer.write_all(&[v as u8])?,
            NpyDtype::I8 => writer.write_all(&(v as i8).to_le_bytes())?,
            NpyDtype::I32 => writer.write_all(&(v as i32).to_le_bytes())?,
            NpyDtype::I64 => writer.write_all(&(v as i64).to_le_bytes())?,
            NpyDtype::F32 => writer.write_all(&(v as f32).to_le_bytes())?,
            NpyDtype::F64 => writer.write_all(&v.to_le_bytes())?,
        }
    }
    writer.flush()?;
    Ok(())
}

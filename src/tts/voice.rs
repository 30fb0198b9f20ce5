use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use zip::ZipArchive;

use super::EngineError;

/// Width of one style embedding row.
pub const STYLE_DIM: usize = 256;

/// Style embeddings for one voice, stored flat as `rows x STYLE_DIM`.
#[derive(Debug, Clone)]
pub struct VoiceStyle {
    rows: usize,
    data: Vec<f32>,
}

impl VoiceStyle {
    /// Style row for a token sequence of the given length, clamped to the last row.
    pub fn row_for_len(&self, token_count: usize) -> &[f32] {
        let index = token_count.min(self.rows.saturating_sub(1));
        let start = index * STYLE_DIM;
        &self.data[start..start + STYLE_DIM]
    }
}

/// Every voice contained in a `voices-v1.0.bin` archive.
#[derive(Debug, Clone)]
pub struct VoicePack {
    voices: BTreeMap<String, VoiceStyle>,
}

impl VoicePack {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)
            .map_err(|e| EngineError::VoicePack(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(file)
            .map_err(|e| EngineError::VoicePack(format!("{}: {}", path.display(), e)))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, String> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| format!("not a valid npz archive: {}", e))?;

        let mut voices = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| format!("failed to read archive entry {}: {}", i, e))?;
            let name = entry.name().to_string();
            let Some(id) = name.strip_suffix(".npy") else {
                continue;
            };

            let mut raw = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut raw)
                .map_err(|e| format!("failed to read {}: {}", name, e))?;
            let style = parse_npy(&raw).map_err(|e| format!("{}: {}", name, e))?;
            voices.insert(id.to_string(), style);
        }

        if voices.is_empty() {
            return Err("archive contains no .npy voice entries".to_string());
        }

        tracing::debug!("Loaded {} voices from voice pack", voices.len());
        Ok(Self { voices })
    }

    pub fn get(&self, voice_id: &str) -> Option<&VoiceStyle> {
        self.voices.get(voice_id)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }
}

#[cfg(test)]
impl VoicePack {
    /// Pack where every voice has `rows` style rows filled with `fill`.
    pub(crate) fn uniform(ids: &[&str], rows: usize, fill: f32) -> Self {
        let voices = ids
            .iter()
            .map(|id| {
                let style = VoiceStyle {
                    rows,
                    data: vec![fill; rows * STYLE_DIM],
                };
                (id.to_string(), style)
            })
            .collect();
        Self { voices }
    }
}

/// Parse a little-endian f32, C-order `.npy` array whose last dimension is `STYLE_DIM`.
fn parse_npy(bytes: &[u8]) -> Result<VoiceStyle, String> {
    if bytes.len() < 10 || &bytes[0..6] != b"\x93NUMPY" {
        return Err("invalid npy magic header".to_string());
    }

    let (header_len, header_offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        other => return Err(format!("unsupported npy version {}", other)),
    };

    let header_end = header_offset + header_len;
    if bytes.len() < header_end {
        return Err("npy header length exceeds payload size".to_string());
    }
    let header = std::str::from_utf8(&bytes[header_offset..header_end])
        .map_err(|_| "npy header is not valid utf-8".to_string())?;

    let descr = header_field(header, "descr").ok_or("npy header missing 'descr'")?;
    if descr != "<f4" {
        return Err(format!("unsupported dtype '{}', expected '<f4'", descr));
    }
    let fortran =
        header_field(header, "fortran_order").ok_or("npy header missing 'fortran_order'")?;
    if fortran != "False" {
        return Err("fortran-ordered arrays are not supported".to_string());
    }
    let shape = header_shape(header).ok_or("npy header missing 'shape'")?;
    if shape.last() != Some(&STYLE_DIM) {
        return Err(format!(
            "expected trailing dimension {}, got shape {:?}",
            STYLE_DIM, shape
        ));
    }

    let count = shape
        .iter()
        .try_fold(1_usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| format!("shape {:?} overflows", shape))?;
    let rows = count / STYLE_DIM;
    if rows == 0 {
        return Err(format!("voice has no style rows, got shape {:?}", shape));
    }
    let byte_len = count
        .checked_mul(4)
        .ok_or_else(|| format!("shape {:?} overflows", shape))?;

    let data_bytes = &bytes[header_end..];
    if data_bytes.len() != byte_len {
        return Err(format!(
            "data size mismatch: expected {} bytes, got {}",
            byte_len,
            data_bytes.len()
        ));
    }

    let data: Vec<f32> = data_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(VoiceStyle { rows, data })
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let rest = header[header.find(&pattern)? + pattern.len()..].trim_start();

    if let Some(quoted) = rest.strip_prefix('\'') {
        return quoted.split('\'').next();
    }
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn header_shape(header: &str) -> Option<Vec<usize>> {
    let rest = &header[header.find("'shape':")?..];
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse().ok())
        .collect()
}

//! Marker dictionaries.
//!
//! Tables under `data/` are compiled in; a table file in the dictionary
//! directory overrides the compiled-in one. Both use the same JSON format,
//! one file per dictionary named `<NAME>_CODES.json`:
//!
//! ```json
//! {"name": "DICT_4X4_50", "marker_size": 4, "max_correction_bits": 1, "codes": [...]}
//! ```
//!
//! Each code packs the inner `marker_size × marker_size` bits row-major
//! (`bit = y * n + x`, least significant first) with black = 1.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use camcal_core::DictionaryName;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builtins::builtin_table;
use crate::matcher::rotate_code;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("dictionary table for {name} not found at {}", path.display())]
    Missing { name: DictionaryName, path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed dictionary file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dictionary {name}: expected {expected}-bit markers, file has {found}")]
    MarkerSize {
        name: DictionaryName,
        expected: usize,
        found: usize,
    },
    #[error("dictionary {name} file is labelled {found:?}")]
    NameMismatch { name: DictionaryName, found: String },
    #[error("dictionary {0} has no codes")]
    Empty(DictionaryName),
    #[error("could only generate {found} of {wanted} codes for {name}")]
    Generation {
        name: DictionaryName,
        found: usize,
        wanted: usize,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct DictionaryFile {
    name: String,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Vec<u64>,
}

/// A marker dictionary with its code table.
#[derive(Clone, Debug, PartialEq)]
pub struct Dictionary {
    pub name: DictionaryName,
    /// Inner bits per marker side.
    pub marker_size: usize,
    /// Largest Hamming distance the dictionary can correct.
    pub max_correction_bits: u8,
    /// One code per marker id.
    pub codes: Vec<u64>,
}

impl Dictionary {
    /// Build from an in-memory table; the marker size follows `name`.
    pub fn from_codes(
        name: DictionaryName,
        max_correction_bits: u8,
        codes: Vec<u64>,
    ) -> Result<Self, DictionaryError> {
        if codes.is_empty() {
            return Err(DictionaryError::Empty(name));
        }
        Ok(Self {
            name,
            marker_size: name.marker_bits(),
            max_correction_bits,
            codes,
        })
    }

    /// Greedy random code search: every accepted code keeps at least
    /// `min_distance` bits from all rotations of itself and of earlier codes.
    ///
    /// Deterministic for a given `seed`.
    pub fn generate(
        name: DictionaryName,
        count: usize,
        min_distance: u32,
        seed: u64,
    ) -> Result<Self, DictionaryError> {
        let n = name.marker_bits();
        let mask = if n * n == 64 { u64::MAX } else { (1u64 << (n * n)) - 1 };
        let mut rng = StdRng::seed_from_u64(seed);
        let mut codes: Vec<u64> = Vec::with_capacity(count);
        let mut rotations: Vec<u64> = Vec::with_capacity(4 * count);

        for _ in 0..count.saturating_mul(2000) {
            if codes.len() == count {
                break;
            }
            let cand = rng.random::<u64>() & mask;

            let rots = [1, 2, 3].map(|r| rotate_code(cand, n, r));
            let self_ok = rots.iter().all(|&r| (r ^ cand).count_ones() >= min_distance);
            let far = rotations.iter().all(|&r| (r ^ cand).count_ones() >= min_distance);
            if self_ok && far {
                codes.push(cand);
                rotations.push(cand);
                rotations.extend(rots);
            }
        }

        if codes.len() < count {
            return Err(DictionaryError::Generation {
                name,
                found: codes.len(),
                wanted: count,
            });
        }
        let correction = (min_distance.saturating_sub(1) / 2) as u8;
        Self::from_codes(name, correction, codes)
    }

    /// Path where `name`'s table is expected inside `dir`.
    pub fn table_path(dir: &Path, name: DictionaryName) -> PathBuf {
        dir.join(format!("{}_CODES.json", name.as_str()))
    }

    /// The compiled-in table for `name`, if the crate ships one.
    pub fn builtin(name: DictionaryName) -> Option<Self> {
        let table = builtin_table(name.as_str())?;
        if table.marker_size != name.marker_bits() || table.codes.is_empty() {
            return None;
        }
        Some(Self {
            name,
            marker_size: table.marker_size,
            max_correction_bits: table.max_correction_bits,
            codes: table.codes.to_vec(),
        })
    }

    /// `<dir>/<NAME>_CODES.json` when present, else the compiled-in table.
    pub fn resolve(dir: &Path, name: DictionaryName) -> Result<Self, DictionaryError> {
        let path = Self::table_path(dir, name);
        if path.is_file() {
            return Self::load_json(&path, name);
        }
        Self::builtin(name).ok_or(DictionaryError::Missing { name, path })
    }

    /// Load `name` from `<dir>/<NAME>_CODES.json`.
    pub fn load_named(dir: &Path, name: DictionaryName) -> Result<Self, DictionaryError> {
        let path = Self::table_path(dir, name);
        if !path.is_file() {
            return Err(DictionaryError::Missing { name, path });
        }
        Self::load_json(&path, name)
    }

    /// Load a table file and check it against `name`.
    pub fn load_json(path: &Path, name: DictionaryName) -> Result<Self, DictionaryError> {
        let file = File::open(path).map_err(|source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: DictionaryFile =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| DictionaryError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        if raw.name != name.as_str() {
            return Err(DictionaryError::NameMismatch {
                name,
                found: raw.name,
            });
        }
        if raw.marker_size != name.marker_bits() {
            return Err(DictionaryError::MarkerSize {
                name,
                expected: name.marker_bits(),
                found: raw.marker_size,
            });
        }
        Self::from_codes(name, raw.max_correction_bits, raw.codes)
    }

    /// Write the table in the format [`Dictionary::load_json`] reads.
    pub fn write_json(&self, path: &Path) -> Result<(), DictionaryError> {
        let io_err = |source| DictionaryError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let raw = DictionaryFile {
            name: self.name.as_str().to_string(),
            marker_size: self.marker_size,
            max_correction_bits: self.max_correction_bits,
            codes: self.codes.clone(),
        };
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &raw).map_err(|source| DictionaryError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)
    }

    /// Dictionaries with a table present in `dir`.
    pub fn available(dir: &Path) -> Vec<DictionaryName> {
        DictionaryName::ALL
            .iter()
            .copied()
            .filter(|&n| Self::table_path(dir, n).is_file())
            .collect()
    }

    /// Dictionaries compiled into the crate.
    pub fn builtin_names() -> Vec<DictionaryName> {
        DictionaryName::ALL
            .iter()
            .copied()
            .filter(|&n| builtin_table(n.as_str()).is_some())
            .collect()
    }

    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Black/white modules of marker `id` including a one-module black
    /// border, row-major over `(marker_size + 2)²`.
    pub fn marker_modules(&self, id: u32) -> Option<Vec<bool>> {
        let code = *self.codes.get(id as usize)?;
        let n = self.marker_size;
        let cells = n + 2;
        let mut out = vec![true; cells * cells];
        for y in 0..n {
            for x in 0..n {
                out[(y + 1) * cells + x + 1] = (code >> (y * n + x)) & 1 == 1;
            }
        }
        Some(out)
    }
}

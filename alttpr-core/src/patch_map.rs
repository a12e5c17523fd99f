use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

use crate::{PatchError, Result};

/// A run of bytes the seed writes at a fixed ROM offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSegment {
    offset: u32,
    bytes: Vec<u8>,
}

impl PatchSegment {
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Sparse offset -> byte run table built from a seed's patch records.
///
/// The wire format is a list of single-key objects (`[{"1234": [1, 2]}, ...]`);
/// it is collapsed into a sorted map once, at construction. Duplicate
/// offsets keep the last record seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchMap {
    segments: BTreeMap<u32, PatchSegment>,
    // Ascending copy of the keys, used by the nearest-offset search.
    offsets: Vec<u32>,
}

impl PatchMap {
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (u32, Vec<u8>)>,
    {
        let mut segments = BTreeMap::new();
        for (offset, bytes) in records {
            segments.insert(offset, PatchSegment { offset, bytes });
        }
        let offsets = segments.keys().copied().collect();
        PatchMap { segments, offsets }
    }

    /// Build from the raw wire records, parsing each decimal offset key.
    pub fn from_records(records: Vec<BTreeMap<String, Vec<u8>>>) -> Result<Self> {
        let mut flat = Vec::with_capacity(records.len());
        for record in records {
            for (key, bytes) in record {
                let offset = key
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| PatchError::InvalidOffset(key.clone()))?;
                flat.push((offset, bytes));
            }
        }
        let map = PatchMap::build(flat);
        log::debug!("patch map built with {} segments", map.len());
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in ascending offset order.
    pub fn segments(&self) -> impl Iterator<Item = &PatchSegment> {
        self.segments.values()
    }

    pub fn exact_lookup(&self, offset: u32) -> Option<&[u8]> {
        self.segments.get(&offset).map(|s| s.bytes())
    }

    /// Read up to `count` bytes at `offset` (the rest of the segment when
    /// `count` is `None`).
    ///
    /// An exact key is read from its start. Otherwise the nearest key is
    /// chosen (ties go to the higher key) and the read starts at
    /// `offset - key` inside that segment. Reads are clipped to the segment;
    /// a start position outside it yields an empty slice.
    pub fn seek(&self, offset: u32, count: Option<usize>) -> Result<&[u8]> {
        if let Some(bytes) = self.exact_lookup(offset) {
            return Ok(clip(bytes, 0, count));
        }

        let (min, max) = match (self.offsets.first(), self.offsets.last()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Err(PatchError::EmptyPatchMap),
        };
        if offset < min || offset > max {
            return Err(PatchError::OutOfRange { offset, min, max });
        }

        let key = self.nearest_key(offset);
        let bytes = self.segments[&key].bytes();
        // A key above the target gives a negative start: nothing to read.
        let local = i64::from(offset) - i64::from(key);
        if local < 0 {
            return Ok(&[]);
        }
        Ok(clip(bytes, local as usize, count))
    }

    fn nearest_key(&self, target: u32) -> u32 {
        let keys = &self.offsets;
        let mut low: isize = 0;
        let mut high: isize = keys.len() as isize - 1;

        while low <= high {
            let mid = (low + high) / 2;
            let key = keys[mid as usize];
            if key == target {
                return key;
            }
            if key < target {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }

        // Converged with high == low - 1; the caller has already checked
        // that target lies inside [min, max], so both indices are valid.
        let above = keys[low as usize];
        let below = keys[high as usize];
        if above - target <= target - below {
            above
        } else {
            below
        }
    }
}

fn clip(bytes: &[u8], start: usize, count: Option<usize>) -> &[u8] {
    if start >= bytes.len() {
        return &[];
    }
    let end = match count {
        Some(n) => start.saturating_add(n).min(bytes.len()),
        None => bytes.len(),
    };
    &bytes[start..end]
}

impl<'de> Deserialize<'de> for PatchMap {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let records = Vec::<BTreeMap<String, Vec<u8>>>::deserialize(deserializer)?;
        PatchMap::from_records(records).map_err(<D::Error as serde::de::Error>::custom)
    }
}

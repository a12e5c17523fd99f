use crc32fast::Hasher;

use crate::{PatchError, Result};

const MAGIC: &[u8; 4] = b"BPS1";
const FOOTER_LEN: usize = 12;

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

fn bps_err(msg: impl Into<String>) -> PatchError {
    PatchError::Bps(msg.into())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| bps_err("unexpected end of patch"))?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let out = self
            .pos
            .checked_add(len)
            .and_then(|end| self.data.get(self.pos..end))
            .ok_or_else(|| bps_err("unexpected end of patch"))?;
        self.pos += len;
        Ok(out)
    }

    fn number(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift: u64 = 1;
        loop {
            let b = self.byte()?;
            value = (u64::from(b & 0x7f))
                .checked_mul(shift)
                .and_then(|v| v.checked_add(value))
                .ok_or_else(|| bps_err("number overflows"))?;
            if b & 0x80 != 0 {
                return Ok(value);
            }
            shift = shift.checked_mul(0x80).ok_or_else(|| bps_err("number overflows"))?;
            value = value.checked_add(shift).ok_or_else(|| bps_err("number overflows"))?;
        }
    }

    fn size(&mut self) -> Result<usize> {
        usize::try_from(self.number()?).map_err(|_| bps_err("size does not fit in memory"))
    }

    fn signed(&mut self) -> Result<i64> {
        let n = self.number()?;
        let magnitude = i64::try_from(n >> 1).map_err(|_| bps_err("relative offset overflows"))?;
        Ok(if n & 1 != 0 { -magnitude } else { magnitude })
    }
}

fn footer_crc(patch: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([patch[at], patch[at + 1], patch[at + 2], patch[at + 3]])
}

fn relative(base: usize, delta: i64) -> Result<usize> {
    let moved = i64::try_from(base)
        .ok()
        .and_then(|b| b.checked_add(delta))
        .ok_or_else(|| bps_err("relative offset overflows"))?;
    usize::try_from(moved).map_err(|_| bps_err("copy offset before start of buffer"))
}

/// Apply a BPS patch to `source`, verifying all three checksums.
pub fn apply(source: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    if patch.len() < MAGIC.len() + FOOTER_LEN || &patch[..4] != MAGIC {
        return Err(bps_err("not a BPS1 patch"));
    }
    let body_end = patch.len() - FOOTER_LEN;
    if crc32(&patch[..patch.len() - 4]) != footer_crc(patch, patch.len() - 4) {
        return Err(bps_err("patch checksum mismatch"));
    }
    if crc32(source) != footer_crc(patch, body_end) {
        return Err(bps_err("source rom checksum mismatch"));
    }

    let mut reader = Reader {
        data: &patch[..body_end],
        pos: MAGIC.len(),
    };
    let source_size = reader.size()?;
    let target_size = reader.size()?;
    let metadata_size = reader.size()?;
    reader.bytes(metadata_size)?;
    if source_size != source.len() {
        return Err(bps_err(format!(
            "patch expects a {} byte source, got {}",
            source_size,
            source.len()
        )));
    }

    let mut target = Vec::with_capacity(target_size);
    let mut source_rel = 0usize;
    let mut target_rel = 0usize;

    while reader.pos < body_end {
        let action = reader.number()?;
        let len = usize::try_from((action >> 2) + 1).map_err(|_| bps_err("action too long"))?;
        if target.len() + len > target_size {
            return Err(bps_err("patch writes past the target size"));
        }
        match action & 3 {
            // SourceRead
            0 => {
                let at = target.len();
                let run = source
                    .get(at..at + len)
                    .ok_or_else(|| bps_err("source read past end of source"))?;
                target.extend_from_slice(run);
            }
            // TargetRead
            1 => target.extend_from_slice(reader.bytes(len)?),
            // SourceCopy
            2 => {
                source_rel = relative(source_rel, reader.signed()?)?;
                let run = source
                    .get(source_rel..source_rel + len)
                    .ok_or_else(|| bps_err("source copy past end of source"))?;
                target.extend_from_slice(run);
                source_rel += len;
            }
            // TargetCopy; runs may overlap the bytes they produce.
            _ => {
                target_rel = relative(target_rel, reader.signed()?)?;
                for _ in 0..len {
                    let b = *target
                        .get(target_rel)
                        .ok_or_else(|| bps_err("target copy reads unwritten bytes"))?;
                    target.push(b);
                    target_rel += 1;
                }
            }
        }
    }

    if target.len() != target_size {
        return Err(bps_err(format!(
            "patch produced {} bytes, expected {}",
            target.len(),
            target_size
        )));
    }
    if crc32(&target) != footer_crc(patch, body_end + 4) {
        return Err(bps_err("target rom checksum mismatch"));
    }
    log::debug!("bps patch produced {} byte rom", target.len());
    Ok(target)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode_number(mut n: u64, out: &mut Vec<u8>) {
        loop {
            let x = (n & 0x7f) as u8;
            n >>= 7;
            if n == 0 {
                out.push(0x80 | x);
                return;
            }
            out.push(x);
            n -= 1;
        }
    }

    pub(crate) fn finish(mut body: Vec<u8>, source: &[u8], target: &[u8]) -> Vec<u8> {
        body.extend_from_slice(&crc32(source).to_le_bytes());
        body.extend_from_slice(&crc32(target).to_le_bytes());
        let crc = crc32(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    /// source "ABCDEFGH" -> target "ABCDxyxyxyEF"
    fn sample() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let source = b"ABCDEFGH".to_vec();
        let target = b"ABCDxyxyxyEF".to_vec();
        let mut body = b"BPS1".to_vec();
        encode_number(source.len() as u64, &mut body);
        encode_number(target.len() as u64, &mut body);
        encode_number(0, &mut body);
        // SourceRead 4
        encode_number((3 << 2) | 0, &mut body);
        // TargetRead "xy"
        encode_number((1 << 2) | 1, &mut body);
        body.extend_from_slice(b"xy");
        // TargetCopy 4 from target offset 4
        encode_number((3 << 2) | 3, &mut body);
        encode_number(4 << 1, &mut body);
        // SourceCopy 2 from source offset 4
        encode_number((1 << 2) | 2, &mut body);
        encode_number(4 << 1, &mut body);
        let patch = finish(body, &source, &target);
        (source, target, patch)
    }

    #[test]
    fn applies_all_actions() {
        let (source, target, patch) = sample();
        assert_eq!(apply(&source, &patch).unwrap(), target);
    }

    #[test]
    fn number_round_trips_multi_byte_values() {
        let mut buf = Vec::new();
        encode_number(0x1_0000, &mut buf);
        let mut reader = Reader { data: &buf, pos: 0 };
        assert_eq!(reader.number().unwrap(), 0x1_0000);
    }

    #[test]
    fn wrong_source_is_rejected() {
        let (_, _, patch) = sample();
        assert!(matches!(apply(b"ABCDEFGX", &patch), Err(PatchError::Bps(_))));
    }

    #[test]
    fn corrupt_patch_is_rejected() {
        let (source, _, mut patch) = sample();
        patch[6] ^= 0xff;
        assert!(matches!(apply(&source, &patch), Err(PatchError::Bps(_))));
        assert!(matches!(apply(&source, b"UPS1"), Err(PatchError::Bps(_))));
    }

    #[test]
    fn huge_relative_offset_is_rejected() {
        let source = b"ABCDEFGH".to_vec();
        let target = b"ABCD".to_vec();
        let mut body = b"BPS1".to_vec();
        encode_number(source.len() as u64, &mut body);
        encode_number(target.len() as u64, &mut body);
        encode_number(0, &mut body);
        // SourceCopy 2 from +0, then SourceCopy 2 jumping by i64::MAX
        encode_number((1 << 2) | 2, &mut body);
        encode_number(0, &mut body);
        encode_number((1 << 2) | 2, &mut body);
        encode_number((i64::MAX as u64) << 1, &mut body);
        let patch = finish(body, &source, &target);
        assert!(matches!(apply(&source, &patch), Err(PatchError::Bps(_))));
    }

    #[test]
    fn relative_offsets_are_checked() {
        assert_eq!(relative(4, -4).unwrap(), 0);
        assert!(matches!(relative(2, i64::MAX), Err(PatchError::Bps(_))));
        assert!(matches!(relative(0, -1), Err(PatchError::Bps(_))));
    }
}

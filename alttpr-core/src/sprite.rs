use crate::{PatchError, Result};

pub(crate) const GFX_ADDR: usize = 0x80000;
pub(crate) const PALETTE_ADDR: usize = 0xdd308;
pub(crate) const GLOVES_ADDR: usize = 0xdedf5;
pub(crate) const GFX_LEN: usize = 0x7000;
pub(crate) const PALETTE_LEN: usize = 0x78;
pub(crate) const GLOVES_LEN: usize = 4;

/// Credits tile rows for the sprite author, and the signature the base ROM
/// carries at the start of each row when it supports the display.
pub(crate) const AUTHOR_UPPER_ADDR: usize = 0x118000;
pub(crate) const AUTHOR_LOWER_ADDR: usize = 0x11801e;
pub(crate) const AUTHOR_SIGNATURE: [u8; 2] = [0x02, 0x37];
pub(crate) const AUTHOR_WIDTH: usize = 28;

const ZSPR_MAGIC: &[u8; 4] = b"ZSPR";
const ZSPR_GFX_OFFSET: usize = 9;
const ZSPR_PALETTE_OFFSET: usize = 15;
const ZSPR_STRINGS_START: usize = 0x1d;
const ZSPR_NO_GFX: u32 = 0xffff_ffff;

// Legacy dumps keep the glove colours inside the palette block.
const LEGACY_GLOVE_BYTES: [usize; 4] = [0x7036, 0x7037, 0x7054, 0x7055];

/// A sprite payload, classified once from its first four bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpriteContainer<'a> {
    LegacyRaw(LegacySprite<'a>),
    Zspr(ZsprSprite<'a>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySprite<'a> {
    pub graphics: &'a [u8],
    pub palette: &'a [u8],
    pub gloves: [u8; 4],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZsprSprite<'a> {
    /// `None` when the container flags that it carries no graphics block.
    pub graphics: Option<&'a [u8]>,
    pub palette: &'a [u8],
    pub gloves: &'a [u8],
    pub author: String,
}

impl<'a> SpriteContainer<'a> {
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() >= 4 && &payload[..4] == ZSPR_MAGIC {
            parse_zspr(payload).map(SpriteContainer::Zspr)
        } else {
            parse_legacy(payload).map(SpriteContainer::LegacyRaw)
        }
    }

    pub fn is_zspr(&self) -> bool {
        matches!(self, SpriteContainer::Zspr(_))
    }
}

fn parse_legacy(payload: &[u8]) -> Result<LegacySprite<'_>> {
    let needed = GFX_LEN + PALETTE_LEN;
    if payload.len() < needed {
        return Err(PatchError::MalformedSprite(format!(
            "raw sprite dump is {} bytes, expected at least {}",
            payload.len(),
            needed
        )));
    }
    Ok(LegacySprite {
        graphics: &payload[..GFX_LEN],
        palette: &payload[GFX_LEN..needed],
        gloves: LEGACY_GLOVE_BYTES.map(|i| payload[i]),
    })
}

fn read_u32_le(payload: &[u8], at: usize) -> Result<u32> {
    payload
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| PatchError::MalformedSprite(format!("ZSPR header truncated at byte {at}")))
}

fn block<'a>(payload: &'a [u8], start: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    start
        .checked_add(len)
        .and_then(|end| payload.get(start..end))
        .ok_or_else(|| {
            PatchError::MalformedSprite(format!(
                "ZSPR {what} block {start:#x}+{len:#x} runs past the {} byte payload",
                payload.len()
            ))
        })
}

fn parse_zspr(payload: &[u8]) -> Result<ZsprSprite<'_>> {
    if payload.len() < ZSPR_STRINGS_START {
        return Err(PatchError::MalformedSprite(format!(
            "ZSPR header needs {} bytes, payload has {}",
            ZSPR_STRINGS_START,
            payload.len()
        )));
    }
    let gfx_offset = read_u32_le(payload, ZSPR_GFX_OFFSET)?;
    let palette_offset = read_u32_le(payload, ZSPR_PALETTE_OFFSET)? as usize;

    let graphics = if gfx_offset == ZSPR_NO_GFX {
        None
    } else {
        Some(block(payload, gfx_offset as usize, GFX_LEN, "graphics")?)
    };
    let palette = block(payload, palette_offset, PALETTE_LEN, "palette")?;
    let gloves = block(payload, palette_offset + PALETTE_LEN, GLOVES_LEN, "glove")?;

    Ok(ZsprSprite {
        graphics,
        palette,
        gloves,
        author: read_author(payload)?,
    })
}

/// The display name and author are stored as two null-terminated UTF-16
/// strings; the ASCII author used for the credits follows them.
fn read_author(payload: &[u8]) -> Result<String> {
    let mut pos = ZSPR_STRINGS_START;
    let mut terminators = 0;
    while terminators < 2 {
        let word = payload.get(pos..pos + 2).ok_or_else(|| {
            PatchError::MalformedSprite("ZSPR name fields are not terminated".to_string())
        })?;
        if word[0] == 0 && word[1] == 0 {
            terminators += 1;
        }
        pos += 2;
    }

    let rest = &payload[pos.min(payload.len())..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
}

/// Centre `author` in the credits line and upper-case it. Extra padding
/// goes on the right; names longer than the line are cut.
pub fn format_author(author: &str) -> String {
    let name: String = author
        .chars()
        .take(AUTHOR_WIDTH)
        .collect::<String>()
        .to_uppercase()
        .chars()
        .take(AUTHOR_WIDTH)
        .collect();
    let len = name.chars().count();
    let left = (AUTHOR_WIDTH - len) / 2;
    let right = AUTHOR_WIDTH - len - left;
    format!("{}{}{}", " ".repeat(left), name, " ".repeat(right))
}

/// Credits font (upper tile, lower tile) for a character. Anything the font
/// lacks renders as a blank.
pub fn author_glyph(c: char) -> (u8, u8) {
    match c {
        'A'..='Z' => {
            let i = c as u8 - b'A';
            (0x5d + i, 0x81 + i)
        }
        '0'..='9' => {
            let i = c as u8 - b'0';
            (0x53 + i, 0x77 + i)
        }
        '\'' => (0x77, 0x9b),
        '.' => (0xa0, 0xc0),
        '/' => (0xa2, 0xc2),
        ':' => (0xa3, 0xc3),
        '_' => (0xa6, 0xc6),
        _ => (0x9f, 0x9f),
    }
}

/// Tile rows for a formatted author line, as (upper, lower).
pub fn author_tiles(line: &str) -> (Vec<u8>, Vec<u8>) {
    line.chars().map(author_glyph).unzip()
}

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub mod bps;
pub mod cosmetics;
pub mod drops;
pub mod patch_map;
pub mod repository;
pub mod rom;
pub mod spoiler;
pub mod sprite;

pub use cosmetics::{CosmeticSettings, HeartBeep, HeartColor, MenuSpeed};
pub use patch_map::{PatchMap, PatchSegment};
pub use repository::{AssetRepository, MemoryRepository};
pub use rom::{strip_copier_header, PatchedRom, RomPatcher};
pub use spoiler::{SpoilerDecoder, SpoilerOptions};
pub use sprite::SpriteContainer;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch map is empty")]
    EmptyPatchMap,
    #[error("offset {offset:#x} is outside the patched range {min:#x}..={max:#x}")]
    OutOfRange { offset: u32, min: u32, max: u32 },
    #[error("unrecognized {field} byte {byte:#04x}")]
    UnrecognizedByte { field: &'static str, byte: u8 },
    #[error("malformed sprite: {0}")]
    MalformedSprite(String),
    #[error("patch record has a non-numeric offset {0:?}")]
    InvalidOffset(String),
    #[error("{len} bytes at {offset:#x} fall outside the {rom_len} byte rom")]
    WriteOutOfBounds {
        offset: usize,
        len: usize,
        rom_len: usize,
    },
    #[error("rom is {actual} bytes, need at least {needed}")]
    RomTooSmall { needed: usize, actual: usize },
    #[error("bps patch error: {0}")]
    Bps(String),
    #[error("missing asset: {0}")]
    MissingAsset(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PatchError>;

fn default_size() -> u32 {
    2
}

/// A generated seed as returned by the randomizer service.
#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    pub hash: String,
    #[serde(default)]
    pub logic: Option<String>,
    #[serde(default)]
    pub generated: Option<String>,
    /// ROM size in MiB.
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub spoiler: Value,
    pub patch: PatchMap,
    #[serde(default)]
    pub current_rom_hash: Option<String>,
}

impl Seed {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn permalink(&self, base: &str) -> String {
        format!("{}{}", base, self.hash)
    }
}

/// Patch an already base-diffed ROM with a seed and the player's cosmetics.
pub fn create_patched_game(
    seed: &Seed,
    rom: Vec<u8>,
    settings: &CosmeticSettings,
    sprite: Option<&[u8]>,
) -> Result<PatchedRom> {
    let mut patcher = RomPatcher::new(rom);
    patcher.resize(seed.size);
    patcher.apply_patch_map(&seed.patch)?;
    patcher.apply_cosmetics(settings)?;
    if let Some(payload) = sprite {
        patcher.inject_sprite(payload)?;
    }
    let rom = patcher.finalize()?;
    log::info!(
        "patched seed {} ({} bytes, checksum {:#06x})",
        seed.hash,
        rom.len(),
        rom.checksum()
    );
    Ok(rom)
}

/// Look a seed up and build its ROM from the player's base ROM.
///
/// When the seed names a `current_rom_hash`, the matching base diff is
/// applied first.
pub fn build_game(
    repo: &dyn AssetRepository,
    hash: &str,
    base_rom: &[u8],
    settings: &CosmeticSettings,
) -> Result<PatchedRom> {
    let seed = repo
        .seed(hash)
        .ok_or_else(|| PatchError::MissingAsset(format!("seed {hash}")))?;

    let rom = match seed.current_rom_hash.as_deref() {
        Some(rom_hash) => {
            let diff = repo
                .base_patch(rom_hash)
                .ok_or_else(|| PatchError::MissingAsset(format!("base patch {rom_hash}")))?;
            bps::apply(base_rom, diff)?
        }
        None => base_rom.to_vec(),
    };

    let sprite = match settings.sprite_name.as_deref() {
        Some(name) => Some(
            repo.sprite(name)
                .ok_or_else(|| PatchError::MissingAsset(format!("sprite {name}")))?,
        ),
        None => None,
    };

    create_patched_game(seed, rom, settings, sprite)
}

/// Look a seed up and decode its spoiler report.
pub fn build_spoiler(
    repo: &dyn AssetRepository,
    hash: &str,
    options: &SpoilerOptions,
) -> Result<String> {
    let seed = repo
        .seed(hash)
        .ok_or_else(|| PatchError::MissingAsset(format!("seed {hash}")))?;
    SpoilerDecoder::new(seed, options).decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bps::tests::{encode_number, finish};
    use crate::sprite::tests::legacy_payload;
    use serde_json::json;

    const ROM_LEN: usize = 2 << 20;

    fn seed_json(current_rom_hash: Option<&str>) -> Value {
        json!({
            "hash": "zYxW",
            "logic": "NoGlitches",
            "generated": "2021-05-01T12:00:00+00:00",
            "size": 2,
            "spoiler": {
                "meta": { "spoilers": "on" },
                "Special": {}
            },
            "patch": [
                { "1573397": [1, 2, 3, 4, 5] },
                { "4096": [0xaa, 0xbb] }
            ],
            "current_rom_hash": current_rom_hash
        })
    }

    // Copies the source as-is and then overwrites its first byte.
    fn base_patch(source: &[u8], target: &[u8]) -> Vec<u8> {
        let mut body = b"BPS1".to_vec();
        encode_number(source.len() as u64, &mut body);
        encode_number(target.len() as u64, &mut body);
        encode_number(0, &mut body);
        encode_number(1, &mut body); // TargetRead 1
        body.push(target[0]);
        encode_number(((source.len() as u64 - 2) << 2) | 2, &mut body); // SourceCopy
        encode_number(1 << 1, &mut body);
        finish(body, source, target)
    }

    #[test]
    fn seed_parses_and_collapses_patch_records() {
        let seed = Seed::from_value(seed_json(None)).unwrap();
        assert_eq!(seed.size, 2);
        assert_eq!(seed.patch.len(), 2);
        assert_eq!(seed.patch.exact_lookup(4096), Some(&[0xaa, 0xbb][..]));
        assert_eq!(seed.permalink("https://alttpr.com/h/"), "https://alttpr.com/h/zYxW");
    }

    #[test]
    fn seed_with_bad_offset_fails_to_parse() {
        let mut value = seed_json(None);
        value["patch"] = json!([{ "0x10": [1] }]);
        assert!(matches!(Seed::from_value(value), Err(PatchError::Json(_))));
    }

    #[test]
    fn build_game_without_base_diff() {
        let mut repo = MemoryRepository::new();
        repo.insert_seed(Seed::from_value(seed_json(None)).unwrap());
        repo.insert_sprite("legacy", legacy_payload());

        let settings = CosmeticSettings {
            quickswap: true,
            sprite_name: Some("legacy".to_string()),
            ..CosmeticSettings::default()
        };
        let rom = build_game(&repo, "zYxW", &vec![0; ROM_LEN], &settings).unwrap();
        let bytes = rom.as_bytes();
        assert_eq!(bytes.len(), ROM_LEN);
        assert_eq!(&bytes[4096..4098], &[0xaa, 0xbb]);
        assert_eq!(&bytes[0x180215..0x18021a], &[1, 2, 3, 4, 5]);
        assert_eq!(bytes[0x18004b], 1);
        assert_eq!(bytes[0x80000], 0x11);

        let checksum = rom.checksum();
        assert_eq!(&bytes[0x7fde..0x7fe0], &checksum.to_le_bytes());
        assert_eq!(&bytes[0x7fdc..0x7fde], &(checksum ^ 0xffff).to_le_bytes());
    }

    #[test]
    fn build_game_applies_base_diff_first() {
        let source = vec![0u8; ROM_LEN];
        let mut target = source.clone();
        target[0] = 0x42;

        let mut repo = MemoryRepository::new();
        repo.insert_seed(Seed::from_value(seed_json(Some("deadbeef"))).unwrap());
        repo.insert_base_patch("deadbeef", base_patch(&source, &target));

        let rom = build_game(&repo, "zYxW", &source, &CosmeticSettings::default()).unwrap();
        assert_eq!(rom.as_bytes()[0], 0x42);
        assert_eq!(&rom.as_bytes()[4096..4098], &[0xaa, 0xbb]);
    }

    #[test]
    fn missing_assets_are_reported() {
        let mut repo = MemoryRepository::new();
        assert!(matches!(
            build_spoiler(&repo, "nope", &SpoilerOptions::default()),
            Err(PatchError::MissingAsset(_))
        ));

        repo.insert_seed(Seed::from_value(seed_json(Some("unknown"))).unwrap());
        assert!(matches!(
            build_game(&repo, "zYxW", &[0; 16], &CosmeticSettings::default()),
            Err(PatchError::MissingAsset(_))
        ));
    }

    #[test]
    fn build_spoiler_emits_json_text() {
        let mut repo = MemoryRepository::new();
        repo.insert_seed(Seed::from_value(seed_json(None)).unwrap());
        let options = SpoilerOptions {
            pretty: false,
            ..SpoilerOptions::default()
        };
        let text = build_spoiler(&repo, "zYxW", &options).unwrap();
        let report: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            report["meta"]["code"],
            json!(["Boomerang", "Hookshot", "Bomb", "Mushroom", "Powder"])
        );
        assert!(!text.contains('\n'));
    }
}

use serde_json::{Map, Value};

use crate::patch_map::PatchMap;
use crate::{PatchError, Result};
use DropToken::*;

// Drop table locations in the ROM.
const TREE_PULL_ADDR: u32 = 0xefbd4;
const STUN_ADDR: u32 = 0x37993;
const FISH_ADDR: u32 = 0xe82cc;
const CRAB_MAIN_ADDR: u32 = 0x329c8;
const CRAB_LAST_ADDR: u32 = 0x329c4;
const PRIZE_PACK_ADDR: u32 = 0x37a78;
const PRIZE_PACK_SLOTS: usize = 8;
const PRIZE_PACK_GROUPS: usize = 7;
// Seven numbered packs followed by the tree-pull pack.
const PRIZE_PACK_LEN: usize = PRIZE_PACK_SLOTS * (PRIZE_PACK_GROUPS + 1);

/// Sprite ids the game can spawn as an enemy or interaction drop.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DropToken {
    Heart,
    RupeeGreen,
    RupeeBlue,
    RupeeRed,
    BombRefill1,
    BombRefill4,
    BombRefill8,
    MagicRefillSmall,
    MagicRefillFull,
    ArrowRefill5,
    ArrowRefill10,
    Fairy,
    Bee,
    BeeGood,
}

impl DropToken {
    pub fn from_byte(byte: u8) -> Option<Self> {
        let token = match byte {
            0xd8 => DropToken::Heart,
            0xd9 => DropToken::RupeeGreen,
            0xda => DropToken::RupeeBlue,
            0xdb => DropToken::RupeeRed,
            0xdc => DropToken::BombRefill1,
            0xdd => DropToken::BombRefill4,
            0xde => DropToken::BombRefill8,
            0xdf => DropToken::MagicRefillSmall,
            0xe0 => DropToken::MagicRefillFull,
            0xe1 => DropToken::ArrowRefill5,
            0xe2 => DropToken::ArrowRefill10,
            0xe3 => DropToken::Fairy,
            0x79 => DropToken::Bee,
            0xb2 => DropToken::BeeGood,
            _ => return None,
        };
        Some(token)
    }

    pub fn name(self) -> &'static str {
        match self {
            DropToken::Heart => "Heart",
            DropToken::RupeeGreen => "RupeeGreen",
            DropToken::RupeeBlue => "RupeeBlue",
            DropToken::RupeeRed => "RupeeRed",
            DropToken::BombRefill1 => "BombRefill1",
            DropToken::BombRefill4 => "BombRefill4",
            DropToken::BombRefill8 => "BombRefill8",
            DropToken::MagicRefillSmall => "MagicRefillSmall",
            DropToken::MagicRefillFull => "MagicRefillFull",
            DropToken::ArrowRefill5 => "ArrowRefill5",
            DropToken::ArrowRefill10 => "ArrowRefill10",
            DropToken::Fairy => "Fairy",
            DropToken::Bee => "Bee",
            DropToken::BeeGood => "BeeGood",
        }
    }

    pub fn is_bee(self) -> bool {
        matches!(self, DropToken::Bee | DropToken::BeeGood)
    }
}

/// Decode raw drop bytes, failing on the first byte that is not a drop.
pub fn decode_drop_bytes(field: &'static str, bytes: &[u8]) -> Result<Vec<DropToken>> {
    bytes
        .iter()
        .map(|&byte| {
            DropToken::from_byte(byte).ok_or(PatchError::UnrecognizedByte { field, byte })
        })
        .collect()
}

/// The vanilla prize packs, used to name a group that was left unshuffled.
pub const PRIZE_PACK_TEMPLATES: [(&str, [DropToken; 8]); 7] = [
    (
        "Heart",
        [Heart, Heart, Heart, Heart, RupeeGreen, Heart, Heart, RupeeGreen],
    ),
    (
        "Rupee",
        [RupeeBlue, RupeeGreen, RupeeBlue, RupeeRed, RupeeBlue, RupeeGreen, RupeeBlue, RupeeBlue],
    ),
    (
        "Magic",
        [
            MagicRefillFull,
            MagicRefillSmall,
            MagicRefillSmall,
            RupeeBlue,
            MagicRefillFull,
            MagicRefillSmall,
            Heart,
            MagicRefillSmall,
        ],
    ),
    (
        "Bomb",
        [
            BombRefill1,
            BombRefill1,
            BombRefill1,
            BombRefill4,
            BombRefill1,
            BombRefill1,
            BombRefill8,
            BombRefill1,
        ],
    ),
    (
        "Arrow",
        [
            ArrowRefill5,
            Heart,
            ArrowRefill5,
            ArrowRefill10,
            ArrowRefill5,
            Heart,
            ArrowRefill5,
            ArrowRefill10,
        ],
    ),
    (
        "SmallVariety",
        [
            MagicRefillSmall,
            RupeeGreen,
            Heart,
            ArrowRefill5,
            MagicRefillSmall,
            BombRefill1,
            RupeeGreen,
            Heart,
        ],
    ),
    (
        "BigVariety",
        [
            Heart,
            Fairy,
            MagicRefillFull,
            RupeeRed,
            BombRefill8,
            Heart,
            RupeeRed,
            ArrowRefill10,
        ],
    ),
];

fn join_names(tokens: &[DropToken]) -> String {
    tokens.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
}

/// Name a prize pack group: the matching template when the group is
/// identical to one (and holds no bees), otherwise its comma-joined drops.
pub fn describe_prize_pack(tokens: &[DropToken]) -> String {
    if !tokens.iter().any(|t| t.is_bee()) {
        if let Some((name, _)) = PRIZE_PACK_TEMPLATES
            .iter()
            .find(|(_, template)| template[..] == *tokens)
        {
            return name.to_string();
        }
    }
    join_names(tokens)
}

fn read_field(
    map: &PatchMap,
    field: &'static str,
    offset: u32,
    count: usize,
) -> Result<Vec<DropToken>> {
    decode_drop_bytes(field, map.seek(offset, Some(count))?)
}

fn names_value(tokens: &[DropToken]) -> Value {
    Value::Array(tokens.iter().map(|t| Value::from(t.name())).collect())
}

// A field that fails to decode is reported as null; the rest still decode.
fn field_value(field: &str, decoded: Result<Value>) -> Value {
    decoded.unwrap_or_else(|err| {
        log::warn!("could not decode {field} drops: {err}");
        Value::Null
    })
}

fn prize_packs(map: &PatchMap) -> Result<Value> {
    let bytes = map.seek(PRIZE_PACK_ADDR, Some(PRIZE_PACK_LEN))?;
    let mut packs = Map::new();
    for (group, chunk) in bytes.chunks(PRIZE_PACK_SLOTS).enumerate() {
        if group < PRIZE_PACK_GROUPS {
            let value = decode_drop_bytes("prize pack", chunk)
                .map(|tokens| Value::from(describe_prize_pack(&tokens)));
            packs.insert(group.to_string(), field_value("prize pack", value));
        } else {
            let value = decode_drop_bytes("pull pack", chunk).map(|t| Value::from(join_names(&t)));
            packs.insert("pull".to_string(), field_value("pull pack", value));
        }
    }
    Ok(Value::Object(packs))
}

/// Decode every drop table the seed touches into a JSON object.
pub fn decode_drops(map: &PatchMap) -> Value {
    let mut drops = Map::new();

    let pulls = read_field(map, "tree pull", TREE_PULL_ADDR, 3).map(|tokens| {
        let mut tiers = Map::new();
        for (i, token) in tokens.iter().enumerate() {
            tiers.insert(format!("Tier{}", i + 1), Value::from(token.name()));
        }
        Value::Object(tiers)
    });
    drops.insert("PullTree".to_string(), field_value("tree pull", pulls));

    let crab = read_field(map, "crab", CRAB_MAIN_ADDR, 1).and_then(|main| {
        let last = read_field(map, "crab", CRAB_LAST_ADDR, 1)?;
        let mut crab = Map::new();
        crab.insert("Main".to_string(), names_value(&main));
        crab.insert("Final".to_string(), names_value(&last));
        Ok(Value::Object(crab))
    });
    drops.insert("RupeeCrab".to_string(), field_value("crab", crab));

    let stun = read_field(map, "stun", STUN_ADDR, 1).map(|t| names_value(&t));
    drops.insert("Stun".to_string(), field_value("stun", stun));

    let fish = read_field(map, "fish", FISH_ADDR, 1).map(|t| names_value(&t));
    drops.insert("FishSave".to_string(), field_value("fish", fish));

    drops.insert("PrizePacks".to_string(), field_value("prize pack", prize_packs(map)));

    Value::Object(drops)
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::drops::decode_drops;
use crate::patch_map::PatchMap;
use crate::{PatchError, Result, Seed};

const HASH_CODE_ADDR: u32 = 0x180215;
const HASH_CODE_LEN: usize = 5;
const DIG_GAME_ADDR: u32 = 0x180020;

/// File-select screen icons, indexed by hash byte.
pub const HASH_ICONS: [&str; 32] = [
    "Bow", "Boomerang", "Hookshot", "Bomb", "Mushroom", "Powder", "Ice Rod", "Pendant",
    "Bombos", "Ether", "Quake", "Lamp", "Hammer", "Shovel", "Ocarina", "Bug Net",
    "Book", "Bottle", "Potion", "Cane", "Cape", "Mirror", "Boots", "Gloves",
    "Flippers", "Pearl", "Shield", "Tunic", "Heart", "Map", "Compass", "Key",
];

/// Sections copied through to the report untouched.
const PASSTHROUGH_SECTIONS: [&str; 3] = ["Bosses", "Equipment", "Shops"];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dungeon {
    HyruleCastle,
    EasternPalace,
    DesertPalace,
    TowerOfHera,
    CastleTower,
    PalaceOfDarkness,
    SwampPalace,
    SkullWoods,
    ThievesTown,
    IcePalace,
    MiseryMire,
    TurtleRock,
    GanonsTower,
}

/// Dungeons that hold a pendant or crystal.
const PRIZE_DUNGEONS: [Dungeon; 10] = [
    Dungeon::EasternPalace,
    Dungeon::DesertPalace,
    Dungeon::TowerOfHera,
    Dungeon::PalaceOfDarkness,
    Dungeon::SwampPalace,
    Dungeon::SkullWoods,
    Dungeon::ThievesTown,
    Dungeon::IcePalace,
    Dungeon::MiseryMire,
    Dungeon::TurtleRock,
];

/// Suffix codes on generic dungeon items (`BigKeyP1`, `MapD4`, ...).
const DUNGEON_SUFFIXES: [(&str, Dungeon); 14] = [
    ("H1", Dungeon::HyruleCastle),
    ("H2", Dungeon::HyruleCastle),
    ("P1", Dungeon::EasternPalace),
    ("P2", Dungeon::DesertPalace),
    ("P3", Dungeon::TowerOfHera),
    ("A1", Dungeon::CastleTower),
    ("D1", Dungeon::PalaceOfDarkness),
    ("D2", Dungeon::SwampPalace),
    ("D3", Dungeon::SkullWoods),
    ("D4", Dungeon::ThievesTown),
    ("D5", Dungeon::IcePalace),
    ("D6", Dungeon::MiseryMire),
    ("D7", Dungeon::TurtleRock),
    ("A2", Dungeon::GanonsTower),
];

/// Section labels used by a seed's spoiler. Entrance-shuffled seeds come
/// from a different generator and name some dungeons differently.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionSet {
    Standard,
    EntranceShuffle,
}

impl RegionSet {
    pub fn for_meta(meta: &Map<String, Value>) -> Self {
        let shuffled = ["shuffle", "entrances"].iter().any(|key| match meta.get(*key) {
            Some(Value::String(mode)) => mode != "none",
            Some(Value::Bool(on)) => *on,
            _ => false,
        });
        if shuffled {
            RegionSet::EntranceShuffle
        } else {
            RegionSet::Standard
        }
    }

    pub fn dungeon_label(self, dungeon: Dungeon) -> &'static str {
        let entrance = self == RegionSet::EntranceShuffle;
        match dungeon {
            Dungeon::HyruleCastle => "Hyrule Castle",
            Dungeon::EasternPalace => "Eastern Palace",
            Dungeon::DesertPalace => "Desert Palace",
            Dungeon::TowerOfHera if entrance => "Tower of Hera",
            Dungeon::TowerOfHera => "Tower Of Hera",
            Dungeon::CastleTower if entrance => "Castle Tower",
            Dungeon::CastleTower => "Hyrule Castle Tower",
            Dungeon::PalaceOfDarkness if entrance => "Palace of Darkness",
            Dungeon::PalaceOfDarkness => "Dark Palace",
            Dungeon::SwampPalace => "Swamp Palace",
            Dungeon::SkullWoods => "Skull Woods",
            Dungeon::ThievesTown => "Thieves Town",
            Dungeon::IcePalace => "Ice Palace",
            Dungeon::MiseryMire => "Misery Mire",
            Dungeon::TurtleRock => "Turtle Rock",
            Dungeon::GanonsTower => "Ganons Tower",
        }
    }

    /// Every section of the report, in output order.
    pub fn sections(self) -> Vec<&'static str> {
        let dungeons = [
            Dungeon::HyruleCastle,
            Dungeon::EasternPalace,
            Dungeon::DesertPalace,
            Dungeon::TowerOfHera,
            Dungeon::CastleTower,
            Dungeon::PalaceOfDarkness,
            Dungeon::SwampPalace,
            Dungeon::SkullWoods,
            Dungeon::ThievesTown,
            Dungeon::IcePalace,
            Dungeon::MiseryMire,
            Dungeon::TurtleRock,
            Dungeon::GanonsTower,
        ];
        let mut sections = vec!["Special"];
        sections.extend(dungeons.iter().map(|&d| self.dungeon_label(d)));
        sections.extend(["Light World", "Death Mountain", "Dark World"]);
        sections
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpoilerOptions {
    pub include_drops: bool,
    pub permalink_base: String,
    pub pretty: bool,
}

impl Default for SpoilerOptions {
    fn default() -> Self {
        SpoilerOptions {
            include_drops: true,
            permalink_base: "https://alttpr.com/h/".to_string(),
            pretty: true,
        }
    }
}

/// Decode the 5 hash icons shown on the file select screen.
pub fn hash_code(map: &PatchMap) -> Result<Vec<&'static str>> {
    map.seek(HASH_CODE_ADDR, Some(HASH_CODE_LEN))?
        .iter()
        .map(|&byte| {
            HASH_ICONS
                .get(byte as usize)
                .copied()
                .ok_or(PatchError::UnrecognizedByte { field: "hash code", byte })
        })
        .collect()
}

/// Drop `:1` world markers and tag generic dungeon items with their dungeon.
pub fn clean_entry(regions: RegionSet, location: &str, item: &str) -> (String, String) {
    let location = strip_world_marker(location).to_string();
    let mut item = strip_world_marker(item).to_string();
    if let Some((_, dungeon)) = DUNGEON_SUFFIXES.iter().find(|(code, _)| item.ends_with(code)) {
        item = format!("{}-{}", item, regions.dungeon_label(*dungeon));
    }
    (location, item)
}

fn strip_world_marker(text: &str) -> &str {
    text.strip_suffix(":1").unwrap_or(text)
}

fn is_prize(item: &str) -> bool {
    item.contains("Crystal") || item.ends_with("Pendant")
}

/// Turns a seed's spoiler and patch data into a readable report.
pub struct SpoilerDecoder<'a> {
    seed: &'a Seed,
    options: &'a SpoilerOptions,
}

impl<'a> SpoilerDecoder<'a> {
    pub fn new(seed: &'a Seed, options: &'a SpoilerOptions) -> Self {
        SpoilerDecoder { seed, options }
    }

    fn meta(&self) -> Option<&Map<String, Value>> {
        self.seed.spoiler.get("meta").and_then(Value::as_object)
    }

    /// Spoiler metadata plus the seed hash, permalink and hash code.
    fn annotated_meta(&self) -> Result<Value> {
        let mut meta = self.meta().cloned().unwrap_or_default();
        meta.insert("hash".to_string(), Value::from(self.seed.hash.as_str()));
        meta.insert(
            "permalink".to_string(),
            Value::from(self.seed.permalink(&self.options.permalink_base)),
        );
        meta.insert("code".to_string(), Value::from(hash_code(&self.seed.patch)?));
        Ok(Value::Object(meta))
    }

    /// Seeds generated with hidden spoilers only get their raw log back.
    pub fn is_restricted(&self) -> bool {
        matches!(
            self.meta()
                .and_then(|meta| meta.get("spoilers"))
                .and_then(Value::as_str),
            Some("off") | Some("mystery")
        )
    }

    pub fn region_set(&self) -> RegionSet {
        self.meta().map_or(RegionSet::Standard, RegionSet::for_meta)
    }

    /// Build the report as a JSON value.
    pub fn report(&self) -> Result<Value> {
        if self.is_restricted() {
            log::info!("seed {} has restricted spoilers, emitting raw log", self.seed.hash);
            let mut raw = match &self.seed.spoiler {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            raw.insert("meta".to_string(), self.annotated_meta()?);
            return Ok(Value::Object(raw));
        }

        let regions = self.region_set();
        let mut report = Map::new();
        for section in regions.sections() {
            if let Some(entries) = self.seed.spoiler.get(section).and_then(Value::as_object) {
                report.insert(section.to_string(), Value::Object(clean_section(regions, entries)));
            }
        }

        if let Some(Value::Object(special)) = report.get_mut("Special") {
            if let Ok(&[digs]) = self.seed.patch.seek(DIG_GAME_ADDR, Some(1)) {
                special.insert("Digging Game Prize Count".to_string(), Value::from(digs));
            }
        }

        report.insert("Prizes".to_string(), Value::Object(self.prizes(regions, &report)));

        for section in PASSTHROUGH_SECTIONS {
            if let Some(value) = self.seed.spoiler.get(section) {
                report.insert(section.to_string(), value.clone());
            }
        }

        if self.options.include_drops {
            report.insert("Drops".to_string(), decode_drops(&self.seed.patch));
        }

        report.insert("meta".to_string(), self.annotated_meta()?);
        Ok(Value::Object(report))
    }

    fn prizes(&self, regions: RegionSet, report: &Map<String, Value>) -> Map<String, Value> {
        let mut prizes = Map::new();
        for dungeon in PRIZE_DUNGEONS {
            let label = regions.dungeon_label(dungeon);
            let prize = report
                .get(label)
                .and_then(Value::as_object)
                .and_then(|entries| {
                    entries.values().filter_map(Value::as_str).find(|v| is_prize(v))
                });
            if let Some(prize) = prize {
                prizes.insert(label.to_string(), Value::from(prize));
            }
        }
        prizes
    }

    /// The report as UTF-8 JSON text.
    pub fn decode(&self) -> Result<String> {
        let report = self.report()?;
        let text = if self.options.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        Ok(text)
    }
}

fn clean_section(regions: RegionSet, entries: &Map<String, Value>) -> Map<String, Value> {
    entries
        .iter()
        .map(|(location, item)| match item {
            Value::String(item) => {
                let (location, item) = clean_entry(regions, location, item);
                (location, Value::String(item))
            }
            other => (strip_world_marker(location).to_string(), other.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed(spoilers: &str, shuffle: Option<&str>) -> Seed {
        let mut meta = json!({ "spoilers": spoilers, "logic": "NoGlitches" });
        if let Some(mode) = shuffle {
            meta["shuffle"] = json!(mode);
        }
        Seed::from_value(json!({
            "hash": "abc123",
            "logic": "NoGlitches",
            "generated": "2020-01-01T00:00:00+00:00",
            "size": 2,
            "spoiler": {
                "meta": meta,
                "Special": { "Pyramid Fairy - Left:1": "Bottle:1" },
                "Eastern Palace": {
                    "Eastern Palace - Big Chest:1": "BigKeyP1:1",
                    "Eastern Palace - Prize:1": "Crystal3:1"
                },
                "Dark Palace": {
                    "Palace of Darkness - Prize:1": "GreenPendant:1",
                    "Palace of Darkness - Shooter Room:1": "KeyD1:1"
                },
                "Palace of Darkness": {
                    "Palace of Darkness - Prize:1": "Crystal1:1"
                },
                "Bosses": { "Eastern Palace": "Armos Knights" }
            },
            "patch": [
                { "1573397": [0, 7, 31, 28, 3] },
                { "1572896": [10] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn hash_code_maps_icons() {
        let seed = seed("on", None);
        assert_eq!(
            hash_code(&seed.patch).unwrap(),
            vec!["Bow", "Pendant", "Key", "Heart", "Bomb"]
        );
    }

    #[test]
    fn hash_code_rejects_unknown_icons() {
        let map = PatchMap::build(vec![(HASH_CODE_ADDR, vec![0, 1, 2, 3, 40])]);
        assert!(matches!(
            hash_code(&map),
            Err(PatchError::UnrecognizedByte { byte: 40, .. })
        ));
    }

    #[test]
    fn entries_are_cleaned_and_tagged() {
        let (loc, item) = clean_entry(RegionSet::Standard, "Sewers - Dark Cross:1", "KeyH2:1");
        assert_eq!(loc, "Sewers - Dark Cross");
        assert_eq!(item, "KeyH2-Hyrule Castle");
        let (_, item) = clean_entry(RegionSet::EntranceShuffle, "x", "MapD1");
        assert_eq!(item, "MapD1-Palace of Darkness");
        let (_, item) = clean_entry(RegionSet::Standard, "x", "Lamp");
        assert_eq!(item, "Lamp");
    }

    #[test]
    fn only_trailing_world_marker_is_stripped() {
        let (loc, item) = clean_entry(RegionSet::Standard, "Chest:12", "Arrows:10:1");
        assert_eq!(loc, "Chest:12");
        assert_eq!(item, "Arrows:10");
        let (loc, item) = clean_entry(RegionSet::Standard, "Cave:1:1", "KeyD1:1");
        assert_eq!(loc, "Cave:1");
        assert_eq!(item, "KeyD1-Dark Palace");
    }

    #[test]
    fn region_set_follows_entrance_indicator() {
        let meta = |value: Value| value.as_object().cloned().unwrap();
        assert_eq!(RegionSet::for_meta(&meta(json!({}))), RegionSet::Standard);
        assert_eq!(
            RegionSet::for_meta(&meta(json!({ "shuffle": "none" }))),
            RegionSet::Standard
        );
        assert_eq!(
            RegionSet::for_meta(&meta(json!({ "shuffle": "crossed" }))),
            RegionSet::EntranceShuffle
        );
        assert!(RegionSet::Standard.sections().contains(&"Dark Palace"));
        assert!(RegionSet::EntranceShuffle.sections().contains(&"Palace of Darkness"));
    }

    #[test]
    fn decoded_report_for_standard_seed() {
        let seed = seed("on", None);
        let options = SpoilerOptions {
            include_drops: false,
            ..SpoilerOptions::default()
        };
        let report = SpoilerDecoder::new(&seed, &options).report().unwrap();

        assert_eq!(report["Special"]["Pyramid Fairy - Left"], "Bottle");
        assert_eq!(report["Special"]["Digging Game Prize Count"], 10);
        assert_eq!(
            report["Eastern Palace"]["Eastern Palace - Big Chest"],
            "BigKeyP1-Eastern Palace"
        );
        assert_eq!(
            report["Dark Palace"]["Palace of Darkness - Shooter Room"],
            "KeyD1-Dark Palace"
        );
        assert!(report.get("Palace of Darkness").is_none());
        assert_eq!(report["Prizes"]["Eastern Palace"], "Crystal3");
        assert_eq!(report["Prizes"]["Dark Palace"], "GreenPendant");
        assert_eq!(report["Bosses"]["Eastern Palace"], "Armos Knights");
        assert!(report.get("Drops").is_none());
        assert_eq!(report["meta"]["hash"], "abc123");
        assert_eq!(report["meta"]["permalink"], "https://alttpr.com/h/abc123");
        assert_eq!(report["meta"]["code"][2], "Key");
    }

    #[test]
    fn entrance_seed_uses_its_own_labels() {
        let seed = seed("generate", Some("full"));
        let report = SpoilerDecoder::new(&seed, &SpoilerOptions::default())
            .report()
            .unwrap();
        assert!(report.get("Dark Palace").is_none());
        assert_eq!(report["Prizes"]["Palace of Darkness"], "Crystal1");
        // No drop tables in this patch: the fields are null, the report is not lost.
        assert_eq!(report["Drops"]["Stun"], Value::Null);
    }

    #[test]
    fn restricted_spoilers_are_passed_through() {
        for mode in ["off", "mystery"] {
            let seed = seed(mode, None);
            let options = SpoilerOptions::default();
            let decoder = SpoilerDecoder::new(&seed, &options);
            assert!(decoder.is_restricted());
            let report: Value = serde_json::from_str(&decoder.decode().unwrap()).unwrap();
            assert_eq!(report["Special"]["Pyramid Fairy - Left:1"], "Bottle:1");
            assert!(report.get("Prizes").is_none());
            assert_eq!(report["meta"]["spoilers"], mode);
            assert_eq!(report["meta"]["code"][0], "Bow");
        }
    }

    #[test]
    fn empty_patch_data_fails_the_decode() {
        let mut seed = seed("on", None);
        seed.patch = PatchMap::default();
        let options = SpoilerOptions::default();
        assert!(matches!(
            SpoilerDecoder::new(&seed, &options).decode(),
            Err(PatchError::EmptyPatchMap)
        ));
    }
}

use serde::{Deserialize, Serialize};

pub(crate) const HEART_COLOR_ADDR: usize = 0x187020;
pub(crate) const HEART_BEEP_ADDR: usize = 0x180033;
pub(crate) const MENU_SPEED_ADDR: usize = 0x180048;
/// Menu transition bytes patched alongside the menu speed, with their
/// non-instant values.
pub(crate) const MENU_SPEED_AUX: [(usize, u8); 3] =
    [(0x6dd9a, 0x11), (0x6df2a, 0x12), (0x6e0e9, 0x12)];
pub(crate) const MENU_SPEED_AUX_INSTANT: u8 = 0x20;
pub(crate) const QUICKSWAP_ADDR: usize = 0x18004b;
pub(crate) const REDUCE_FLASHING_ADDR: usize = 0x18017f;
pub(crate) const MSU1_RESUME_ADDR: usize = 0x18021d;
pub(crate) const BACKGROUND_MUSIC_ADDR: usize = 0x18021a;

/// Defines a cosmetic option enum backed by a name -> ROM byte table.
///
/// Unknown names resolve to the default variant, both through
/// `from_name` and when deserializing settings.
macro_rules! option_table {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        { $($variant:ident => ($text:literal, $byte:expr)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_name(name: &str) -> Self {
                match name.trim().to_ascii_lowercase().as_str() {
                    $($text => $name::$variant,)+
                    _ => $name::$default,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn byte(self) -> u8 {
                match self {
                    $($name::$variant => $byte),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                $name::from_name(&name)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.name().to_string()
            }
        }
    };
}

option_table! {
    /// HUD heart palette.
    HeartColor, default = Red, {
        Red => ("red", 0x00),
        Blue => ("blue", 0x01),
        Green => ("green", 0x02),
        Yellow => ("yellow", 0x03),
    }
}

option_table! {
    /// Low-health beep interval.
    HeartBeep, default = Normal, {
        Off => ("off", 0x00),
        Double => ("double", 0x10),
        Normal => ("normal", 0x20),
        Half => ("half", 0x40),
        Quarter => ("quarter", 0x80),
    }
}

option_table! {
    /// Item menu open/close scroll speed.
    MenuSpeed, default = Normal, {
        Slow => ("slow", 0x04),
        Normal => ("normal", 0x08),
        Fast => ("fast", 0x10),
        Instant => ("instant", 0xe8),
    }
}

/// Player-facing options written after the seed's own patch data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CosmeticSettings {
    pub heart_color: HeartColor,
    pub heart_beep: HeartBeep,
    pub menu_speed: MenuSpeed,
    pub quickswap: bool,
    pub reduce_flashing: bool,
    pub msu1_resume: bool,
    pub background_music: bool,
    /// Name of a sprite to fetch from the asset repository.
    pub sprite_name: Option<String>,
}

impl Default for CosmeticSettings {
    fn default() -> Self {
        CosmeticSettings {
            heart_color: HeartColor::default(),
            heart_beep: HeartBeep::default(),
            menu_speed: MenuSpeed::default(),
            quickswap: false,
            reduce_flashing: false,
            msu1_resume: true,
            background_music: true,
            sprite_name: None,
        }
    }
}

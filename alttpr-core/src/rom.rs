use crate::cosmetics::{
    CosmeticSettings, HeartBeep, HeartColor, MenuSpeed, BACKGROUND_MUSIC_ADDR, HEART_BEEP_ADDR,
    HEART_COLOR_ADDR, MENU_SPEED_ADDR, MENU_SPEED_AUX, MENU_SPEED_AUX_INSTANT, MSU1_RESUME_ADDR,
    QUICKSWAP_ADDR, REDUCE_FLASHING_ADDR,
};
use crate::patch_map::PatchMap;
use crate::sprite::{
    author_tiles, format_author, SpriteContainer, ZsprSprite, AUTHOR_LOWER_ADDR,
    AUTHOR_SIGNATURE, AUTHOR_UPPER_ADDR, GFX_ADDR, GLOVES_ADDR, PALETTE_ADDR,
};
use crate::{PatchError, Result};

const CHECKSUM_ADDR: usize = 0x7fdc;
const CHECKSUM_LEN: usize = 4;
const CHECKSUM_BIAS: u32 = 0x1fe;
const COPIER_HEADER_LEN: usize = 0x200;
const MIB: usize = 1 << 20;

/// Owns a ROM image for the length of one patch operation.
///
/// Every write is a fixed-offset, bounds-checked copy. Call `finalize`
/// once all edits are in to fix up the header checksum and get the
/// finished image back.
#[derive(Debug, Clone)]
pub struct RomPatcher {
    rom: Vec<u8>,
}

/// A finished ROM image. Its checksum already matches its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedRom {
    data: Vec<u8>,
    checksum: u16,
}

impl PatchedRom {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Remove a 512-byte copier header if the image carries one.
pub fn strip_copier_header(mut rom: Vec<u8>) -> Vec<u8> {
    if rom.len() % 1024 == COPIER_HEADER_LEN {
        log::debug!("stripping {} byte copier header", COPIER_HEADER_LEN);
        rom.drain(..COPIER_HEADER_LEN);
    }
    rom
}

impl RomPatcher {
    pub fn new(rom: Vec<u8>) -> Self {
        RomPatcher { rom }
    }

    pub fn len(&self) -> usize {
        self.rom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rom.is_empty()
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.rom.get(offset..end))
            .ok_or(PatchError::WriteOutOfBounds {
                offset,
                len,
                rom_len: self.rom.len(),
            })
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let rom_len = self.rom.len();
        let dest = offset
            .checked_add(bytes.len())
            .and_then(|end| self.rom.get_mut(offset..end))
            .ok_or(PatchError::WriteOutOfBounds {
                offset,
                len: bytes.len(),
                rom_len,
            })?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, offset: usize, byte: u8) -> Result<()> {
        self.write_bytes(offset, &[byte])
    }

    /// Cut the image to at most `size_mib` MiB. Never grows it.
    pub fn resize(&mut self, size_mib: u32) {
        let target = (size_mib as usize).saturating_mul(MIB);
        if target < self.rom.len() {
            log::debug!("resizing rom from {} to {} bytes", self.rom.len(), target);
            self.rom.truncate(target);
        }
    }

    /// Write every segment of the seed's patch data at its offset.
    pub fn apply_patch_map(&mut self, map: &PatchMap) -> Result<()> {
        for segment in map.segments() {
            self.write_bytes(segment.offset() as usize, segment.bytes())?;
        }
        log::debug!("applied {} patch segments", map.len());
        Ok(())
    }

    pub fn set_heart_color(&mut self, color: HeartColor) -> Result<()> {
        self.write_u8(HEART_COLOR_ADDR, color.byte())
    }

    pub fn set_heart_beep(&mut self, beep: HeartBeep) -> Result<()> {
        self.write_u8(HEART_BEEP_ADDR, beep.byte())
    }

    pub fn set_menu_speed(&mut self, speed: MenuSpeed) -> Result<()> {
        self.write_u8(MENU_SPEED_ADDR, speed.byte())?;
        for (addr, normal) in MENU_SPEED_AUX {
            let byte = if speed == MenuSpeed::Instant {
                MENU_SPEED_AUX_INSTANT
            } else {
                normal
            };
            self.write_u8(addr, byte)?;
        }
        Ok(())
    }

    pub fn set_quickswap(&mut self, enable: bool) -> Result<()> {
        self.write_u8(QUICKSWAP_ADDR, u8::from(enable))
    }

    pub fn set_reduce_flashing(&mut self, enable: bool) -> Result<()> {
        self.write_u8(REDUCE_FLASHING_ADDR, u8::from(enable))
    }

    /// Enabling keeps whatever resume settings the base ROM ships with.
    pub fn set_msu1_resume(&mut self, enable: bool) -> Result<()> {
        if enable {
            return Ok(());
        }
        self.write_bytes(MSU1_RESUME_ADDR, &[0x00, 0x00])
    }

    pub fn set_background_music(&mut self, enable: bool) -> Result<()> {
        self.write_u8(BACKGROUND_MUSIC_ADDR, u8::from(!enable))
    }

    pub fn apply_cosmetics(&mut self, settings: &CosmeticSettings) -> Result<()> {
        self.set_heart_color(settings.heart_color)?;
        self.set_heart_beep(settings.heart_beep)?;
        self.set_menu_speed(settings.menu_speed)?;
        self.set_quickswap(settings.quickswap)?;
        self.set_reduce_flashing(settings.reduce_flashing)?;
        self.set_msu1_resume(settings.msu1_resume)?;
        self.set_background_music(settings.background_music)?;
        Ok(())
    }

    /// Parse `payload` and write it into the player sprite slots.
    pub fn inject_sprite(&mut self, payload: &[u8]) -> Result<()> {
        let sprite = SpriteContainer::parse(payload)?;
        self.write_sprite(&sprite)
    }

    pub fn write_sprite(&mut self, sprite: &SpriteContainer<'_>) -> Result<()> {
        match sprite {
            SpriteContainer::LegacyRaw(spr) => {
                log::debug!("writing raw sprite dump");
                self.write_bytes(GFX_ADDR, spr.graphics)?;
                self.write_bytes(PALETTE_ADDR, spr.palette)?;
                self.write_bytes(GLOVES_ADDR, &spr.gloves)?;
            }
            SpriteContainer::Zspr(spr) => {
                log::debug!("writing ZSPR sprite by {:?}", spr.author);
                self.write_sprite_author(spr)?;
                if let Some(graphics) = spr.graphics {
                    self.write_bytes(GFX_ADDR, graphics)?;
                }
                self.write_bytes(PALETTE_ADDR, spr.palette)?;
                self.write_bytes(GLOVES_ADDR, spr.gloves)?;
            }
        }
        Ok(())
    }

    fn supports_sprite_author(&self) -> bool {
        let sig = AUTHOR_SIGNATURE.len();
        matches!(
            (
                self.read_bytes(AUTHOR_UPPER_ADDR, sig),
                self.read_bytes(AUTHOR_LOWER_ADDR, sig),
            ),
            (Ok(upper), Ok(lower))
                if upper == &AUTHOR_SIGNATURE[..] && lower == &AUTHOR_SIGNATURE[..]
        )
    }

    fn write_sprite_author(&mut self, spr: &ZsprSprite<'_>) -> Result<()> {
        if !self.supports_sprite_author() {
            log::debug!("base rom has no sprite author credits, skipping");
            return Ok(());
        }
        let (upper, lower) = author_tiles(&format_author(&spr.author));
        self.write_bytes(AUTHOR_UPPER_ADDR + 2, &upper)?;
        self.write_bytes(AUTHOR_LOWER_ADDR + 2, &lower)?;
        Ok(())
    }

    /// Sum of every byte outside the checksum field.
    fn compute_checksum(&self) -> Result<u16> {
        if self.rom.len() < CHECKSUM_ADDR + CHECKSUM_LEN {
            return Err(PatchError::RomTooSmall {
                needed: CHECKSUM_ADDR + CHECKSUM_LEN,
                actual: self.rom.len(),
            });
        }
        let sum = self.rom[..CHECKSUM_ADDR]
            .iter()
            .chain(&self.rom[CHECKSUM_ADDR + CHECKSUM_LEN..])
            .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
        Ok((sum.wrapping_add(CHECKSUM_BIAS) & 0xffff) as u16)
    }

    /// Rewrite the header checksum and its complement. Must run after every
    /// other edit.
    pub fn fix_checksum(&mut self) -> Result<u16> {
        let checksum = self.compute_checksum()?;
        let inverse = checksum ^ 0xffff;
        let [inv_lo, inv_hi] = inverse.to_le_bytes();
        let [sum_lo, sum_hi] = checksum.to_le_bytes();
        self.write_bytes(CHECKSUM_ADDR, &[inv_lo, inv_hi, sum_lo, sum_hi])?;
        log::debug!("rom checksum {:#06x}", checksum);
        Ok(checksum)
    }

    pub fn finalize(mut self) -> Result<PatchedRom> {
        let checksum = self.fix_checksum()?;
        Ok(PatchedRom {
            data: self.rom,
            checksum,
        })
    }
}

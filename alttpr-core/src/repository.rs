use std::collections::HashMap;

use crate::Seed;

/// Source of previously fetched seeds, sprites and base ROM diffs.
///
/// Fetching and caching belong to the caller; the patch pipeline only
/// looks things up through this trait.
pub trait AssetRepository {
    fn seed(&self, hash: &str) -> Option<&Seed>;

    fn sprite(&self, name: &str) -> Option<&[u8]>;

    /// BPS diff that turns the user's base ROM into the one the seed was
    /// built against, keyed by the seed's `current_rom_hash`.
    fn base_patch(&self, rom_hash: &str) -> Option<&[u8]>;
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    seeds: HashMap<String, Seed>,
    sprites: HashMap<String, Vec<u8>>,
    base_patches: HashMap<String, Vec<u8>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a seed under its own hash, replacing any earlier copy.
    pub fn insert_seed(&mut self, seed: Seed) {
        self.seeds.insert(seed.hash.clone(), seed);
    }

    pub fn insert_sprite(&mut self, name: impl Into<String>, payload: Vec<u8>) {
        self.sprites.insert(name.into(), payload);
    }

    pub fn insert_base_patch(&mut self, rom_hash: impl Into<String>, patch: Vec<u8>) {
        self.base_patches.insert(rom_hash.into(), patch);
    }
}

impl AssetRepository for MemoryRepository {
    fn seed(&self, hash: &str) -> Option<&Seed> {
        self.seeds.get(hash)
    }

    fn sprite(&self, name: &str) -> Option<&[u8]> {
        self.sprites.get(name).map(Vec::as_slice)
    }

    fn base_patch(&self, rom_hash: &str) -> Option<&[u8]> {
        self.base_patches.get(rom_hash).map(Vec::as_slice)
    }
}

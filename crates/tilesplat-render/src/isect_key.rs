//! 64 bit intersection keys: `image | tile | depth`, from high to low bits.
//!
//! The low 32 bits hold the IEEE-754 bits of the depth. For non-negative
//! depths these sort the same way as the floats do, so a plain integer sort
//! orders intersections by image, then tile, then front to back.

use crate::error::RenderError;

/// Nr. of bits needed to represent `x`, zero for zero.
pub fn bit_length(x: u32) -> u32 {
    u32::BITS - x.leading_zeros()
}

/// Bit pattern of a non-negative depth, which orders like the depth itself.
pub fn depth_to_bits(depth: f32) -> u32 {
    debug_assert!(depth >= 0.0, "Depth keys need non-negative depths, got {depth}");
    depth.to_bits()
}

/// A decoded intersection key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsectKey {
    pub image: u32,
    pub tile: u32,
    pub depth_bits: u32,
}

impl IsectKey {
    pub fn depth(&self) -> f32 {
        f32::from_bits(self.depth_bits)
    }
}

/// Bit widths of the image and tile fields of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsectKeyLayout {
    pub image_bits: u32,
    pub tile_bits: u32,
}

impl IsectKeyLayout {
    pub fn new(num_images: u32, num_tiles: u32) -> Result<Self, RenderError> {
        let image_bits = bit_length(num_images);
        let tile_bits = bit_length(num_tiles);
        if image_bits + tile_bits + 32 > 64 {
            return Err(RenderError::KeyBitsOverflow {
                image_bits,
                tile_bits,
            });
        }
        Ok(Self {
            image_bits,
            tile_bits,
        })
    }

    /// Nr. of low bits the sort has to look at.
    pub fn sorting_bits(&self) -> u32 {
        self.image_bits + self.tile_bits + 32
    }

    pub fn encode(&self, image: u32, tile: u32, depth: f32) -> u64 {
        (self.group_id(image, tile) << 32) | depth_to_bits(depth) as u64
    }

    /// The high half of a key, shared by all intersections of one tile.
    pub fn group_id(&self, image: u32, tile: u32) -> u64 {
        ((image as u64) << self.tile_bits) | tile as u64
    }

    pub fn decode_group(&self, group: u64) -> (u32, u32) {
        let image = (group >> self.tile_bits) as u32;
        let tile = (group & ((1 << self.tile_bits) - 1)) as u32;
        (image, tile)
    }

    pub fn decode(&self, key: u64) -> IsectKey {
        let (image, tile) = self.decode_group(key >> 32);
        IsectKey {
            image,
            tile,
            depth_bits: key as u32,
        }
    }
}

/// Sort keys ascending, permuting the flattened gaussian ids alongside.
pub fn sort_intersections(
    keys: Vec<u64>,
    flatten_ids: Vec<u32>,
    layout: &IsectKeyLayout,
) -> (Vec<u64>, Vec<u32>) {
    let _span = tracing::trace_span!("radix_argsort", len = keys.len()).entered();
    tilesplat_sort::radix_argsort(keys, flatten_ids, layout.sorting_bits())
}

//! Block layouts of the quantized encodings.
//!
//! Every block covers [`QK`] consecutive values and is `#[repr(C)]` so slices
//! of blocks can be viewed directly from GGUF/GGML byte buffers.

use bytemuck::{Pod, Zeroable};
use half::f16;

use crate::encoding::{Encoding, QK};

/// Non-linear code book of IQ4_NL.
pub const KVALUES_IQ4NL: [i8; 16] = [
    -127, -104, -83, -65, -49, -35, -22, -10, 1, 13, 25, 38, 53, 69, 89, 113,
];

/// 8-bit symmetric block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ8_0 {
    pub d: f16,
    pub qs: [i8; QK],
}

/// 8-bit block carrying `s = d * sum(qs)` for the asymmetric formats.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ8_1 {
    pub d: f16,
    pub s: f16,
    pub qs: [i8; QK],
}

/// 4-bit symmetric block. Low nibbles hold elements 0..16, high nibbles 16..32.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ4_0 {
    pub d: f16,
    pub qs: [u8; QK / 2],
}

/// 4-bit asymmetric block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ4_1 {
    pub d: f16,
    pub m: f16,
    pub qs: [u8; QK / 2],
}

/// 5-bit symmetric block. `qh` holds the fifth bit of every element,
/// little-endian.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockQ5_0 {
    pub d: f16,
    pub qh: [u8; 4],
    pub qs: [u8; QK / 2],
}

/// 4-bit indices into [`KVALUES_IQ4NL`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BlockIq4Nl {
    pub d: f16,
    pub qs: [u8; QK / 2],
}

/// A quantized block that can be expanded to 32 signed 8-bit integers.
///
/// The decoded value of element `i` is `scale() * q[i] + offset()`.
pub trait QuantBlock: Pod + Send + Sync {
    const ENCODING: Encoding;

    /// True when `offset()` can be non-zero.
    const HAS_OFFSET: bool = false;

    fn scale(&self) -> f32;

    fn offset(&self) -> f32 {
        0.0
    }

    /// Writes the integer codes of this block into `out`.
    fn unpack(&self, out: &mut [i8; QK]);
}

/// A block usable as the right-hand side of an integer dot product.
pub trait DotBlock: QuantBlock {
    fn quants(&self) -> &[i8; QK];

    /// `scale() * sum(quants())`, consumed by blocks with an offset.
    fn scaled_sum(&self) -> f32;
}

#[inline]
fn split_nibbles(qs: &[u8; QK / 2], out: &mut [i8; QK], map: impl Fn(u8) -> i8) {
    for (j, &byte) in qs.iter().enumerate() {
        out[j] = map(byte & 0x0F);
        out[j + QK / 2] = map(byte >> 4);
    }
}

impl QuantBlock for BlockQ8_0 {
    const ENCODING: Encoding = Encoding::Q8_0;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        *out = self.qs;
    }
}

impl DotBlock for BlockQ8_0 {
    fn quants(&self) -> &[i8; QK] {
        &self.qs
    }

    fn scaled_sum(&self) -> f32 {
        let sum: i32 = self.qs.iter().map(|&q| q as i32).sum();
        self.d.to_f32() * sum as f32
    }
}

impl QuantBlock for BlockQ8_1 {
    const ENCODING: Encoding = Encoding::Q8_1;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        *out = self.qs;
    }
}

impl DotBlock for BlockQ8_1 {
    fn quants(&self) -> &[i8; QK] {
        &self.qs
    }

    fn scaled_sum(&self) -> f32 {
        self.s.to_f32()
    }
}

impl QuantBlock for BlockQ4_0 {
    const ENCODING: Encoding = Encoding::Q4_0;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        split_nibbles(&self.qs, out, |n| n as i8 - 8);
    }
}

impl QuantBlock for BlockQ4_1 {
    const ENCODING: Encoding = Encoding::Q4_1;
    const HAS_OFFSET: bool = true;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn offset(&self) -> f32 {
        self.m.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        split_nibbles(&self.qs, out, |n| n as i8);
    }
}

impl QuantBlock for BlockQ5_0 {
    const ENCODING: Encoding = Encoding::Q5_0;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        let qh = u32::from_le_bytes(self.qh);
        for (j, &byte) in self.qs.iter().enumerate() {
            let hi0 = (((qh >> j) << 4) & 0x10) as u8;
            let hi1 = ((qh >> (j + 12)) & 0x10) as u8;
            out[j] = ((byte & 0x0F) | hi0) as i8 - 16;
            out[j + QK / 2] = ((byte >> 4) | hi1) as i8 - 16;
        }
    }
}

impl QuantBlock for BlockIq4Nl {
    const ENCODING: Encoding = Encoding::IQ4_NL;

    fn scale(&self) -> f32 {
        self.d.to_f32()
    }

    fn unpack(&self, out: &mut [i8; QK]) {
        split_nibbles(&self.qs, out, |n| KVALUES_IQ4NL[n as usize]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes_match_encoding() {
        assert_eq!(std::mem::size_of::<BlockQ8_0>(), Encoding::Q8_0.size_in_bytes());
        assert_eq!(std::mem::size_of::<BlockQ8_1>(), Encoding::Q8_1.size_in_bytes());
        assert_eq!(std::mem::size_of::<BlockQ4_0>(), Encoding::Q4_0.size_in_bytes());
        assert_eq!(std::mem::size_of::<BlockQ4_1>(), Encoding::Q4_1.size_in_bytes());
        assert_eq!(std::mem::size_of::<BlockQ5_0>(), Encoding::Q5_0.size_in_bytes());
        assert_eq!(std::mem::size_of::<BlockIq4Nl>(), Encoding::IQ4_NL.size_in_bytes());
    }

    #[test]
    fn test_q4_0_nibble_order() {
        let mut qs = [0u8; 16];
        qs[0] = 0xF0; // element 0 -> 0, element 16 -> 15
        let block = BlockQ4_0 { d: f16::from_f32(1.0), qs };
        let mut out = [0i8; QK];
        block.unpack(&mut out);
        assert_eq!(out[0], -8);
        assert_eq!(out[16], 7);
        assert_eq!(out[1], -8);
    }

    #[test]
    fn test_q5_0_high_bits() {
        // Element 0 and element 16 both get the fifth bit.
        let qh = (1u32 | (1u32 << 16)).to_le_bytes();
        let block = BlockQ5_0 { d: f16::from_f32(1.0), qh, qs: [0u8; 16] };
        let mut out = [0i8; QK];
        block.unpack(&mut out);
        assert_eq!(out[0], 0);
        assert_eq!(out[16], 0);
        assert_eq!(out[1], -16);
        assert_eq!(out[17], -16);
    }

    #[test]
    fn test_iq4nl_table_lookup() {
        let block = BlockIq4Nl { d: f16::from_f32(1.0), qs: [0x8F; 16] };
        let mut out = [0i8; QK];
        block.unpack(&mut out);
        assert_eq!(out[0], 113);
        assert_eq!(out[16], 1);
    }

    #[test]
    fn test_q8_0_scaled_sum() {
        let block = BlockQ8_0 { d: f16::from_f32(0.5), qs: [2; QK] };
        assert_eq!(block.scaled_sum(), 32.0);
    }
}

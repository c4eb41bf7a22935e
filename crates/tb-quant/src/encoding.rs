use std::fmt;

/// Number of elements in every quantization block.
pub const QK: usize = 32;

/// Element encodings understood by the multiply engine.
///
/// Discriminants are the GGUF/GGML type ids so tags can cross the C boundary
/// unchanged.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Encoding {
    /// 32-bit floating point.
    F32 = 0,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16 = 1,
    /// 4-bit symmetric blocks: f16 scale + 16 bytes of nibbles.
    Q4_0 = 2,
    /// 4-bit asymmetric blocks: f16 scale, f16 minimum + 16 bytes of nibbles.
    Q4_1 = 3,
    /// 5-bit symmetric blocks: f16 scale, 32 high bits + 16 bytes of nibbles.
    Q5_0 = 6,
    /// 8-bit symmetric blocks: f16 scale + 32 signed bytes.
    Q8_0 = 8,
    /// 8-bit blocks that also carry `d * sum(q)`, paired with `Q4_1`.
    Q8_1 = 9,
    /// 4-bit non-linear blocks decoded through a fixed 16-entry table.
    IQ4_NL = 20,
    /// Brain float: the upper half of an f32.
    BF16 = 30,
}

impl Encoding {
    /// Every encoding, in table order.
    pub const ALL: [Encoding; 9] = [
        Encoding::F32,
        Encoding::F16,
        Encoding::BF16,
        Encoding::Q8_0,
        Encoding::Q8_1,
        Encoding::Q4_0,
        Encoding::Q4_1,
        Encoding::Q5_0,
        Encoding::IQ4_NL,
    ];

    /// Number of encodings; the width of any table indexed by [`Encoding::index`].
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index in `0..COUNT`.
    pub fn index(self) -> usize {
        match self {
            Encoding::F32 => 0,
            Encoding::F16 => 1,
            Encoding::BF16 => 2,
            Encoding::Q8_0 => 3,
            Encoding::Q8_1 => 4,
            Encoding::Q4_0 => 5,
            Encoding::Q4_1 => 6,
            Encoding::Q5_0 => 7,
            Encoding::IQ4_NL => 8,
        }
    }

    /// Returns the size in bytes of a single element for non-quantized types,
    /// or of one block for quantized types.
    ///
    /// - F32: 4 bytes per element
    /// - F16, BF16: 2 bytes per element
    /// - Q4_0, IQ4_NL: 18 bytes per block of 32 (2-byte scale + 16 bytes of nibbles)
    /// - Q4_1: 20 bytes per block (scale + minimum + nibbles)
    /// - Q5_0: 22 bytes per block (scale + 4 bytes of high bits + nibbles)
    /// - Q8_0: 34 bytes per block (scale + 32 quants)
    /// - Q8_1: 36 bytes per block (scale + scaled sum + 32 quants)
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Encoding::F32 => 4,
            Encoding::F16 | Encoding::BF16 => 2,
            Encoding::Q4_0 | Encoding::IQ4_NL => 18,
            Encoding::Q4_1 => 20,
            Encoding::Q5_0 => 22,
            Encoding::Q8_0 => 34,
            Encoding::Q8_1 => 36,
        }
    }

    /// Converts a GGUF type ID to an `Encoding`.
    pub fn from_gguf_type(id: u32) -> Option<Encoding> {
        match id {
            0 => Some(Encoding::F32),
            1 => Some(Encoding::F16),
            2 => Some(Encoding::Q4_0),
            3 => Some(Encoding::Q4_1),
            6 => Some(Encoding::Q5_0),
            8 => Some(Encoding::Q8_0),
            9 => Some(Encoding::Q8_1),
            20 => Some(Encoding::IQ4_NL),
            30 => Some(Encoding::BF16),
            _ => None,
        }
    }

    /// Returns the GGUF type ID for this `Encoding`.
    pub fn to_gguf_type(&self) -> u32 {
        *self as u32
    }

    /// Returns the number of elements per quantization block, or 1 for
    /// non-quantized types.
    pub fn block_size(&self) -> usize {
        if self.is_quantized() {
            QK
        } else {
            1
        }
    }

    /// Returns true if this encoding is a block-quantized format.
    pub fn is_quantized(&self) -> bool {
        !self.is_float()
    }

    /// Returns true for the element-wise floating encodings.
    pub fn is_float(&self) -> bool {
        matches!(self, Encoding::F32 | Encoding::F16 | Encoding::BF16)
    }

    /// The encoding the other operand must be stored in for this encoding's
    /// fast path.
    pub fn vec_dot_type(&self) -> Encoding {
        match self {
            Encoding::Q4_0 | Encoding::Q5_0 | Encoding::Q8_0 | Encoding::IQ4_NL => Encoding::Q8_0,
            Encoding::Q4_1 | Encoding::Q8_1 => Encoding::Q8_1,
            float => *float,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::F32 => "f32",
            Encoding::F16 => "f16",
            Encoding::BF16 => "bf16",
            Encoding::Q4_0 => "q4_0",
            Encoding::Q4_1 => "q4_1",
            Encoding::Q5_0 => "q5_0",
            Encoding::Q8_0 => "q8_0",
            Encoding::Q8_1 => "q8_1",
            Encoding::IQ4_NL => "iq4_nl",
        };
        f.write_str(name)
    }
}

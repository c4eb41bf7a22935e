//! Typed views over operand buffers, one variant per encoding.

use bytemuck::Pod;
use half::{bf16, f16};

use crate::block::{BlockIq4Nl, BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ8_0, BlockQ8_1};
use crate::encoding::Encoding;
use crate::error::{QuantError, Result};

/// Element types that decode to f32 one value at a time.
pub trait FloatElement: Pod + Send + Sync {
    fn to_f32(self) -> f32;
}

impl FloatElement for f32 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }
}

impl FloatElement for f16 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl FloatElement for bf16 {
    #[inline(always)]
    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
}

/// A borrowed operand buffer tagged with its encoding.
///
/// Quantized variants are slices of whole blocks; strides and reduction
/// lengths over them are counted in blocks.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    F32(&'a [f32]),
    F16(&'a [f16]),
    BF16(&'a [bf16]),
    Q8_0(&'a [BlockQ8_0]),
    Q8_1(&'a [BlockQ8_1]),
    Q4_0(&'a [BlockQ4_0]),
    Q4_1(&'a [BlockQ4_1]),
    Q5_0(&'a [BlockQ5_0]),
    IQ4_NL(&'a [BlockIq4Nl]),
}

/// The owning counterpart of [`Operand`].
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedOperand {
    F32(Vec<f32>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    Q8_0(Vec<BlockQ8_0>),
    Q8_1(Vec<BlockQ8_1>),
    Q4_0(Vec<BlockQ4_0>),
    Q4_1(Vec<BlockQ4_1>),
    Q5_0(Vec<BlockQ5_0>),
    IQ4_NL(Vec<BlockIq4Nl>),
}

/// Storage unit of one encoding: an element for floats, a block otherwise.
pub trait Unit: Pod + Send + Sync {
    const ENCODING: Encoding;

    /// Returns the slice behind `op` if it has this unit's encoding.
    fn view<'a>(op: &Operand<'a>) -> Option<&'a [Self]>;
}

macro_rules! impl_unit {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Unit for $ty {
                const ENCODING: Encoding = Encoding::$variant;

                #[inline]
                fn view<'a>(op: &Operand<'a>) -> Option<&'a [Self]> {
                    match *op {
                        Operand::$variant(s) => Some(s),
                        _ => None,
                    }
                }
            }

            impl<'a> From<&'a [$ty]> for Operand<'a> {
                fn from(s: &'a [$ty]) -> Self {
                    Operand::$variant(s)
                }
            }

            impl From<Vec<$ty>> for OwnedOperand {
                fn from(v: Vec<$ty>) -> Self {
                    OwnedOperand::$variant(v)
                }
            }
        )*

        impl<'a> Operand<'a> {
            /// The encoding tag of this operand.
            pub fn encoding(&self) -> Encoding {
                match self {
                    $(Operand::$variant(_) => Encoding::$variant,)*
                }
            }

            /// Number of storage units (elements or blocks).
            pub fn len(&self) -> usize {
                match self {
                    $(Operand::$variant(s) => s.len(),)*
                }
            }

            /// A zero-length operand of the given encoding.
            pub fn empty(encoding: Encoding) -> Self {
                match encoding {
                    $(Encoding::$variant => Operand::$variant(&[]),)*
                }
            }

            /// Reinterprets raw bytes as an operand of the given encoding.
            ///
            /// # Errors
            /// Returns an error if `bytes` is misaligned for the block type or
            /// its length is not a whole number of units.
            pub fn from_bytes(encoding: Encoding, bytes: &'a [u8]) -> Result<Self> {
                match encoding {
                    $(Encoding::$variant => Ok(Operand::$variant(cast(encoding, bytes)?)),)*
                }
            }
        }

        impl OwnedOperand {
            /// Borrows this buffer as an [`Operand`].
            pub fn as_operand(&self) -> Operand<'_> {
                match self {
                    $(OwnedOperand::$variant(v) => Operand::$variant(v),)*
                }
            }
        }
    };
}

impl_unit! {
    f32 => F32,
    f16 => F16,
    bf16 => BF16,
    BlockQ8_0 => Q8_0,
    BlockQ8_1 => Q8_1,
    BlockQ4_0 => Q4_0,
    BlockQ4_1 => Q4_1,
    BlockQ5_0 => Q5_0,
    BlockIq4Nl => IQ4_NL,
}

fn cast<T: Pod>(encoding: Encoding, bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes).map_err(|reason| QuantError::Cast {
        encoding,
        len: bytes.len(),
        reason,
    })
}

impl Operand<'_> {
    /// Returns true if the operand holds no units.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed access to the underlying slice.
    pub fn as_slice<T: Unit>(&self) -> Option<&[T]> {
        T::view(self)
    }
}

impl OwnedOperand {
    pub fn encoding(&self) -> Encoding {
        self.as_operand().encoding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_and_len() {
        let data = vec![1.0f32, 2.0, 3.0];
        let op = Operand::from(data.as_slice());
        assert_eq!(op.encoding(), Encoding::F32);
        assert_eq!(op.len(), 3);
        assert!(!op.is_empty());
        assert_eq!(op.as_slice::<f32>(), Some(&data[..]));
        assert!(op.as_slice::<f16>().is_none());
    }

    #[test]
    fn test_from_bytes_blocks() {
        let blocks = vec![BlockQ8_0 { d: f16::from_f32(2.0), qs: [1; 32] }; 3];
        let bytes: &[u8] = bytemuck::cast_slice(&blocks);
        let op = Operand::from_bytes(Encoding::Q8_0, bytes).unwrap();
        assert_eq!(op.encoding(), Encoding::Q8_0);
        assert_eq!(op.len(), 3);
        assert_eq!(op.as_slice::<BlockQ8_0>().unwrap()[2].d.to_f32(), 2.0);
    }

    #[test]
    fn test_empty_keeps_encoding() {
        for enc in Encoding::ALL {
            let op = Operand::empty(enc);
            assert_eq!(op.encoding(), enc);
            assert!(op.is_empty());
        }
    }

    #[test]
    fn test_from_bytes_bad_length() {
        let bytes = [0u8; 35];
        assert!(Operand::from_bytes(Encoding::Q8_0, &bytes[..]).is_err());
    }

    #[test]
    fn test_owned_roundtrip() {
        let owned = OwnedOperand::from(vec![bf16::from_f32(1.5); 4]);
        assert_eq!(owned.encoding(), Encoding::BF16);
        assert_eq!(owned.as_operand().len(), 4);
    }
}

//! `tb-quant` - Element encodings and block quantization for tinyblas.
//!
//! This crate provides:
//! - The closed set of element encodings (`Encoding`) with GGUF type ids
//! - `#[repr(C)]` block layouts for the quantized encodings
//! - Typed operand views (`Operand`) over borrowed buffers
//! - Reference quantizers and dequantizers

pub mod block;
pub mod dequantize;
pub mod encoding;
pub mod error;
pub mod operand;
pub mod quantize;

// Re-export primary types at the crate root for convenience.
pub use block::{
    BlockIq4Nl, BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ8_0, BlockQ8_1, DotBlock, QuantBlock,
    KVALUES_IQ4NL,
};
pub use dequantize::{dequantize, dequantize_units};
pub use encoding::{Encoding, QK};
pub use error::{QuantError, Result};
pub use operand::{FloatElement, Operand, OwnedOperand, Unit};
pub use quantize::{convert_rows, quantize_row};

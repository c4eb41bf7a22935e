use crate::block::QuantBlock;
use crate::encoding::QK;
use crate::error::{QuantError, Result};
use crate::operand::{FloatElement, Operand};

/// Appends the f32 values of `units` storage units starting at `start` to `out`.
///
/// For quantized operands a unit is a block of 32 values.
pub fn dequantize_units(op: &Operand<'_>, start: usize, units: usize, out: &mut Vec<f32>) -> Result<()> {
    let required = start + units;
    if op.len() < required {
        return Err(QuantError::BufferTooSmall {
            what: "dequantize",
            len: op.len(),
            required,
        });
    }
    let range = start..required;
    match *op {
        Operand::F32(s) => dequantize_float(&s[range], out),
        Operand::F16(s) => dequantize_float(&s[range], out),
        Operand::BF16(s) => dequantize_float(&s[range], out),
        Operand::Q8_0(s) => dequantize_blocks(&s[range], out),
        Operand::Q8_1(s) => dequantize_blocks(&s[range], out),
        Operand::Q4_0(s) => dequantize_blocks(&s[range], out),
        Operand::Q4_1(s) => dequantize_blocks(&s[range], out),
        Operand::Q5_0(s) => dequantize_blocks(&s[range], out),
        Operand::IQ4_NL(s) => dequantize_blocks(&s[range], out),
    }
    Ok(())
}

/// Dequantizes a whole operand.
pub fn dequantize(op: &Operand<'_>) -> Vec<f32> {
    let mut out = Vec::with_capacity(op.len() * op.encoding().block_size());
    // The range is the operand itself, so this cannot fail.
    let _ = dequantize_units(op, 0, op.len(), &mut out);
    out
}

fn dequantize_float<T: FloatElement>(src: &[T], out: &mut Vec<f32>) {
    out.extend(src.iter().map(|&v| v.to_f32()));
}

/// Expands blocks as `scale * q + offset`.
fn dequantize_blocks<B: QuantBlock>(src: &[B], out: &mut Vec<f32>) {
    let mut q = [0i8; QK];
    for block in src {
        block.unpack(&mut q);
        let d = block.scale();
        let m = block.offset();
        out.extend(q.iter().map(|&v| v as f32 * d + m));
    }
}

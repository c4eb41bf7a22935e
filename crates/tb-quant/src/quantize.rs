//! Reference quantizers.
//!
//! Rounding follows the GGML reference implementations so blocks produced here
//! are interchangeable with blocks read from GGUF files.

use half::{bf16, f16};

use crate::block::{
    BlockIq4Nl, BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ8_0, BlockQ8_1, KVALUES_IQ4NL,
};
use crate::dequantize::dequantize_units;
use crate::encoding::{Encoding, QK};
use crate::error::{QuantError, Result};
use crate::operand::{Operand, OwnedOperand};

/// Encodes a row of f32 values.
///
/// # Errors
/// Returns an error if `encoding` is quantized and `src.len()` is not a
/// multiple of the block size.
pub fn quantize_row(encoding: Encoding, src: &[f32]) -> Result<OwnedOperand> {
    let mut out = empty(encoding, src.len() / encoding.block_size());
    quantize_into(src, &mut out)?;
    Ok(out)
}

/// Re-encodes `rows` strided rows of `units` storage units each into a dense
/// buffer of the `target` encoding.
///
/// The result has a row stride of `units * source_block / target_block`.
pub fn convert_rows(
    op: &Operand<'_>,
    rows: usize,
    ld: usize,
    units: usize,
    target: Encoding,
) -> Result<OwnedOperand> {
    let values = units * op.encoding().block_size();
    if values % target.block_size() != 0 {
        return Err(QuantError::RowLength {
            encoding: target,
            len: values,
            block: target.block_size(),
        });
    }
    let mut out = empty(target, rows * values / target.block_size());
    if values == 0 {
        return Ok(out);
    }
    let mut scratch = Vec::with_capacity(values);
    for row in 0..rows {
        scratch.clear();
        dequantize_units(op, row * ld, units, &mut scratch)?;
        quantize_into(&scratch, &mut out)?;
    }
    Ok(out)
}

fn empty(encoding: Encoding, capacity: usize) -> OwnedOperand {
    match encoding {
        Encoding::F32 => OwnedOperand::F32(Vec::with_capacity(capacity)),
        Encoding::F16 => OwnedOperand::F16(Vec::with_capacity(capacity)),
        Encoding::BF16 => OwnedOperand::BF16(Vec::with_capacity(capacity)),
        Encoding::Q8_0 => OwnedOperand::Q8_0(Vec::with_capacity(capacity)),
        Encoding::Q8_1 => OwnedOperand::Q8_1(Vec::with_capacity(capacity)),
        Encoding::Q4_0 => OwnedOperand::Q4_0(Vec::with_capacity(capacity)),
        Encoding::Q4_1 => OwnedOperand::Q4_1(Vec::with_capacity(capacity)),
        Encoding::Q5_0 => OwnedOperand::Q5_0(Vec::with_capacity(capacity)),
        Encoding::IQ4_NL => OwnedOperand::IQ4_NL(Vec::with_capacity(capacity)),
    }
}

/// Appends the encoding of `src` to `out`, in `out`'s encoding.
fn quantize_into(src: &[f32], out: &mut OwnedOperand) -> Result<()> {
    let encoding = out.encoding();
    if encoding.is_quantized() && src.len() % QK != 0 {
        return Err(QuantError::RowLength {
            encoding,
            len: src.len(),
            block: QK,
        });
    }
    match out {
        OwnedOperand::F32(v) => v.extend_from_slice(src),
        OwnedOperand::F16(v) => v.extend(src.iter().map(|&x| f16::from_f32(x))),
        OwnedOperand::BF16(v) => v.extend(src.iter().map(|&x| bf16::from_f32(x))),
        OwnedOperand::Q8_0(v) => v.extend(src.chunks_exact(QK).map(quantize_q8_0)),
        OwnedOperand::Q8_1(v) => v.extend(src.chunks_exact(QK).map(quantize_q8_1)),
        OwnedOperand::Q4_0(v) => v.extend(src.chunks_exact(QK).map(quantize_q4_0)),
        OwnedOperand::Q4_1(v) => v.extend(src.chunks_exact(QK).map(quantize_q4_1)),
        OwnedOperand::Q5_0(v) => v.extend(src.chunks_exact(QK).map(quantize_q5_0)),
        OwnedOperand::IQ4_NL(v) => v.extend(src.chunks_exact(QK).map(quantize_iq4_nl)),
    }
    Ok(())
}

fn inverse(d: f32) -> f32 {
    if d != 0.0 {
        1.0 / d
    } else {
        0.0
    }
}

/// The value with the largest magnitude, sign preserved.
fn signed_absmax(x: &[f32]) -> f32 {
    let mut amax = 0.0f32;
    let mut max = 0.0f32;
    for &v in x {
        if amax < v.abs() {
            amax = v.abs();
            max = v;
        }
    }
    max
}

fn quantize_q8(x: &[f32]) -> (f32, [i8; QK]) {
    let amax = x.iter().fold(0.0f32, |a, v| a.max(v.abs()));
    let d = amax / 127.0;
    let id = inverse(d);
    let mut qs = [0i8; QK];
    for (q, &v) in qs.iter_mut().zip(x) {
        *q = (v * id).round() as i8;
    }
    (d, qs)
}

pub fn quantize_q8_0(x: &[f32]) -> BlockQ8_0 {
    let (d, qs) = quantize_q8(x);
    BlockQ8_0 {
        d: f16::from_f32(d),
        qs,
    }
}

pub fn quantize_q8_1(x: &[f32]) -> BlockQ8_1 {
    let (d, qs) = quantize_q8(x);
    let sum: i32 = qs.iter().map(|&q| q as i32).sum();
    BlockQ8_1 {
        d: f16::from_f32(d),
        s: f16::from_f32(sum as f32 * d),
        qs,
    }
}

pub fn quantize_q4_0(x: &[f32]) -> BlockQ4_0 {
    let d = signed_absmax(x) / -8.0;
    let id = inverse(d);
    let mut qs = [0u8; QK / 2];
    for (j, q) in qs.iter_mut().enumerate() {
        let x0 = ((x[j] * id + 8.5) as u8).min(15);
        let x1 = ((x[j + QK / 2] * id + 8.5) as u8).min(15);
        *q = x0 | (x1 << 4);
    }
    BlockQ4_0 {
        d: f16::from_f32(d),
        qs,
    }
}

pub fn quantize_q4_1(x: &[f32]) -> BlockQ4_1 {
    let min = x.iter().copied().fold(f32::INFINITY, f32::min);
    let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let d = (max - min) / 15.0;
    let id = inverse(d);
    let mut qs = [0u8; QK / 2];
    for (j, q) in qs.iter_mut().enumerate() {
        let x0 = (((x[j] - min) * id + 0.5) as u8).min(15);
        let x1 = (((x[j + QK / 2] - min) * id + 0.5) as u8).min(15);
        *q = x0 | (x1 << 4);
    }
    BlockQ4_1 {
        d: f16::from_f32(d),
        m: f16::from_f32(min),
        qs,
    }
}

pub fn quantize_q5_0(x: &[f32]) -> BlockQ5_0 {
    let d = signed_absmax(x) / -16.0;
    let id = inverse(d);
    let mut qs = [0u8; QK / 2];
    let mut qh = 0u32;
    for (j, q) in qs.iter_mut().enumerate() {
        let x0 = ((x[j] * id + 16.5) as u8).min(31);
        let x1 = ((x[j + QK / 2] * id + 16.5) as u8).min(31);
        *q = (x0 & 0x0F) | ((x1 & 0x0F) << 4);
        qh |= (((x0 & 0x10) >> 4) as u32) << j;
        qh |= (((x1 & 0x10) >> 4) as u32) << (j + QK / 2);
    }
    BlockQ5_0 {
        d: f16::from_f32(d),
        qh: qh.to_le_bytes(),
        qs,
    }
}

fn nearest_iq4nl(v: f32) -> u8 {
    let mut best = 0;
    let mut best_err = f32::INFINITY;
    for (i, &k) in KVALUES_IQ4NL.iter().enumerate() {
        let err = (v - k as f32).abs();
        if err < best_err {
            best_err = err;
            best = i;
        }
    }
    best as u8
}

/// Nearest code book entries for a scale derived from the extreme value,
/// then one least-squares refit of the scale.
pub fn quantize_iq4_nl(x: &[f32]) -> BlockIq4Nl {
    let d = signed_absmax(x) / KVALUES_IQ4NL[0] as f32;
    let id = inverse(d);
    let mut idx = [0u8; QK];
    let mut sumqx = 0.0f32;
    let mut sumq2 = 0.0f32;
    for (i, &v) in idx.iter_mut().zip(x) {
        *i = nearest_iq4nl(v * id);
        let q = KVALUES_IQ4NL[*i as usize] as f32;
        sumqx += v * q;
        sumq2 += q * q;
    }
    let d = if sumq2 > 0.0 { sumqx / sumq2 } else { d };
    let mut qs = [0u8; QK / 2];
    for (j, q) in qs.iter_mut().enumerate() {
        *q = idx[j] | (idx[j + QK / 2] << 4);
    }
    BlockIq4Nl {
        d: f16::from_f32(d),
        qs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dequantize::dequantize;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_row(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    fn max_error(encoding: Encoding, src: &[f32]) -> f32 {
        let q = quantize_row(encoding, src).unwrap();
        let back = dequantize(&q.as_operand());
        assert_eq!(back.len(), src.len());
        src.iter()
            .zip(&back)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_quantize_error_bounds() {
        let row = random_row(128, 7);
        assert!(max_error(Encoding::F16, &row) < 1e-3);
        assert!(max_error(Encoding::BF16, &row) < 1e-2);
        assert!(max_error(Encoding::Q8_0, &row) < 1.0 / 127.0);
        assert!(max_error(Encoding::Q8_1, &row) < 1.0 / 127.0);
        assert!(max_error(Encoding::Q5_0, &row) < 0.08);
        assert!(max_error(Encoding::Q4_0, &row) < 0.15);
        assert!(max_error(Encoding::Q4_1, &row) < 2.0 / 15.0);
        assert!(max_error(Encoding::IQ4_NL, &row) < 0.25);
    }

    #[test]
    fn test_q8_1_sum() {
        let row = random_row(32, 3);
        let block = quantize_q8_1(&row);
        let sum: i32 = block.qs.iter().map(|&q| q as i32).sum();
        approx::assert_relative_eq!(
            block.s.to_f32(),
            block.d.to_f32() * sum as f32,
            max_relative = 1e-2
        );
    }

    #[test]
    fn test_zero_row() {
        let row = vec![0.0f32; 64];
        for enc in Encoding::ALL {
            let back = dequantize(&quantize_row(enc, &row).unwrap().as_operand());
            assert!(back.iter().all(|&v| v == 0.0), "{enc}");
        }
    }

    #[test]
    fn test_row_length_error() {
        assert!(quantize_row(Encoding::Q8_0, &[1.0; 33]).is_err());
        assert!(quantize_row(Encoding::F16, &[1.0; 33]).is_ok());
    }

    #[test]
    fn test_convert_rows_strided() {
        // Two rows of 32 values stored with a stride of 40.
        let mut data = vec![9.0f32; 80];
        for (i, v) in data[..32].iter_mut().enumerate() {
            *v = i as f32 / 32.0;
        }
        for v in &mut data[40..72] {
            *v = -0.25;
        }
        let out = convert_rows(&Operand::F32(&data), 2, 40, 32, Encoding::Q8_0).unwrap();
        assert_eq!(out.encoding(), Encoding::Q8_0);
        let back = dequantize(&out.as_operand());
        assert_eq!(back.len(), 64);
        assert!((back[40] + 0.25).abs() < 1e-3);
        assert!(back.iter().all(|&v| v < 1.0));
    }

    #[test]
    fn test_convert_rows_blocks_to_float() {
        let row = random_row(64, 11);
        let q = quantize_row(Encoding::Q4_0, &row).unwrap();
        let f = convert_rows(&q.as_operand(), 1, 2, 2, Encoding::F32).unwrap();
        assert_eq!(f.as_operand().len(), 64);
    }
}

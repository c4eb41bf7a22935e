//! 128-bit Advanced SIMD lanes for aarch64.

use std::arch::aarch64::*;

use half::{bf16, f16};
use tb_quant::QK;

use super::{DotLane, Lane, Load};

/// Four f32 values in a `v` register.
#[derive(Debug, Clone, Copy)]
pub struct Neon(float32x4_t);

impl Lane for Neon {
    const WIDTH: usize = 4;
    const MR: usize = 5;
    const NR: usize = 5;

    #[inline(always)]
    fn zero() -> Self {
        // SAFETY: neon is part of the capability check.
        Neon(unsafe { vdupq_n_f32(0.0) })
    }

    #[inline(always)]
    fn madd(a: Self, b: Self, acc: Self) -> Self {
        // SAFETY: neon is part of the capability check.
        Neon(unsafe { vfmaq_f32(acc.0, a.0, b.0) })
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        // SAFETY: neon is part of the capability check.
        unsafe { hsum128(self.0) }
    }
}

/// (lo + hi) halves, then the last pair.
#[inline(always)]
unsafe fn hsum128(x: float32x4_t) -> f32 {
    let s = vadd_f32(vget_low_f32(x), vget_high_f32(x));
    vget_lane_f32::<0>(vpadd_f32(s, s))
}

impl Load<f32> for Neon {
    #[inline(always)]
    fn load(src: &[f32]) -> Self {
        assert!(src.len() >= 4);
        // SAFETY: four readable values checked above.
        Neon(unsafe { vld1q_f32(src.as_ptr()) })
    }
}

impl Load<f16> for Neon {
    #[inline(always)]
    fn load(src: &[f16]) -> Self {
        let src = &src[..4];
        let wide = [src[0].to_f32(), src[1].to_f32(), src[2].to_f32(), src[3].to_f32()];
        // SAFETY: reads the local array.
        Neon(unsafe { vld1q_f32(wide.as_ptr()) })
    }
}

impl Load<bf16> for Neon {
    #[inline(always)]
    fn load(src: &[bf16]) -> Self {
        assert!(src.len() >= 4);
        // SAFETY: eight readable bytes checked above.
        Neon(unsafe {
            let h = vld1_u16(src.as_ptr() as *const u16);
            vreinterpretq_f32_u32(vshlq_n_u32::<16>(vmovl_u16(h)))
        })
    }
}

/// Four f32 partial sums fed by widening 8-bit multiplies.
#[derive(Debug, Clone, Copy)]
pub struct NeonDot(float32x4_t);

impl DotLane for NeonDot {
    const MR: usize = 4;
    const NR: usize = 4;

    #[inline(always)]
    fn zero() -> Self {
        // SAFETY: neon is part of the capability check.
        NeonDot(unsafe { vdupq_n_f32(0.0) })
    }

    #[inline(always)]
    fn dot_madd(a: &[i8; QK], b: &[i8; QK], scale: f32, acc: Self) -> Self {
        // SAFETY: both arrays are exactly 32 bytes.
        NeonDot(unsafe {
            let a0 = vld1q_s8(a.as_ptr());
            let a1 = vld1q_s8(a.as_ptr().add(16));
            let b0 = vld1q_s8(b.as_ptr());
            let b1 = vld1q_s8(b.as_ptr().add(16));
            let mut s = vpaddlq_s16(vmull_s8(vget_low_s8(a0), vget_low_s8(b0)));
            s = vpadalq_s16(s, vmull_high_s8(a0, b0));
            s = vpadalq_s16(s, vmull_s8(vget_low_s8(a1), vget_low_s8(b1)));
            s = vpadalq_s16(s, vmull_high_s8(a1, b1));
            vfmaq_f32(acc.0, vcvtq_f32_s32(s), vdupq_n_f32(scale))
        })
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        // SAFETY: neon is part of the capability check.
        unsafe { hsum128(self.0) }
    }
}

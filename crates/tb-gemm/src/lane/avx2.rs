//! 256-bit lanes for x86-64 with AVX2, FMA and F16C.
//!
//! These types may only be used from code reached after the matching
//! capability check: every intrinsic below assumes the features are present.

use std::arch::x86_64::*;

use half::{bf16, f16};
use tb_quant::QK;

use super::{DotLane, Lane, Load};

/// Eight f32 values in a `ymm` register.
#[derive(Debug, Clone, Copy)]
pub struct Avx2(__m256);

impl Lane for Avx2 {
    const WIDTH: usize = 8;
    const MR: usize = 4;
    const NR: usize = 3;

    #[inline(always)]
    fn zero() -> Self {
        // SAFETY: avx is implied by the avx2 capability check.
        Avx2(unsafe { _mm256_setzero_ps() })
    }

    #[inline(always)]
    fn madd(a: Self, b: Self, acc: Self) -> Self {
        // SAFETY: fma is part of the capability check.
        Avx2(unsafe { _mm256_fmadd_ps(a.0, b.0, acc.0) })
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        // SAFETY: avx is part of the capability check; sse3 is implied by it.
        unsafe { hsum256(self.0) }
    }
}

/// (lo + hi) halves, then pairs, then the last two lanes.
#[inline(always)]
unsafe fn hsum256(x: __m256) -> f32 {
    let lo = _mm256_castps256_ps128(x);
    let hi = _mm256_extractf128_ps::<1>(x);
    let s = _mm_add_ps(lo, hi);
    let s = _mm_add_ps(s, _mm_movehl_ps(s, s));
    let s = _mm_add_ss(s, _mm_movehdup_ps(s));
    _mm_cvtss_f32(s)
}

impl Load<f32> for Avx2 {
    #[inline(always)]
    fn load(src: &[f32]) -> Self {
        assert!(src.len() >= 8);
        // SAFETY: eight readable values checked above.
        Avx2(unsafe { _mm256_loadu_ps(src.as_ptr()) })
    }
}

impl Load<f16> for Avx2 {
    #[inline(always)]
    fn load(src: &[f16]) -> Self {
        assert!(src.len() >= 8);
        // SAFETY: sixteen readable bytes checked above; f16c is part of the
        // capability check.
        Avx2(unsafe { _mm256_cvtph_ps(_mm_loadu_si128(src.as_ptr() as *const __m128i)) })
    }
}

impl Load<bf16> for Avx2 {
    #[inline(always)]
    fn load(src: &[bf16]) -> Self {
        assert!(src.len() >= 8);
        // SAFETY: sixteen readable bytes checked above.
        Avx2(unsafe {
            let h = _mm_loadu_si128(src.as_ptr() as *const __m128i);
            _mm256_castsi256_ps(_mm256_slli_epi32::<16>(_mm256_cvtepu16_epi32(h)))
        })
    }
}

/// Eight f32 partial sums fed by widened `madd` integer products.
#[derive(Debug, Clone, Copy)]
pub struct Avx2Dot(__m256);

impl DotLane for Avx2Dot {
    const MR: usize = 4;
    const NR: usize = 3;

    #[inline(always)]
    fn zero() -> Self {
        // SAFETY: see the module docs.
        Avx2Dot(unsafe { _mm256_setzero_ps() })
    }

    #[inline(always)]
    fn dot_madd(a: &[i8; QK], b: &[i8; QK], scale: f32, acc: Self) -> Self {
        // SAFETY: both arrays are exactly 32 bytes; avx2 and fma are part of
        // the capability check.
        Avx2Dot(unsafe {
            // Widen to i16 so -128 codes multiply exactly.
            let a_lo = _mm256_cvtepi8_epi16(_mm_loadu_si128(a.as_ptr() as *const __m128i));
            let a_hi = _mm256_cvtepi8_epi16(_mm_loadu_si128(a.as_ptr().add(16) as *const __m128i));
            let b_lo = _mm256_cvtepi8_epi16(_mm_loadu_si128(b.as_ptr() as *const __m128i));
            let b_hi = _mm256_cvtepi8_epi16(_mm_loadu_si128(b.as_ptr().add(16) as *const __m128i));
            let sums = _mm256_add_epi32(
                _mm256_madd_epi16(a_lo, b_lo),
                _mm256_madd_epi16(a_hi, b_hi),
            );
            _mm256_fmadd_ps(_mm256_set1_ps(scale), _mm256_cvtepi32_ps(sums), acc.0)
        })
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        // SAFETY: see the module docs.
        unsafe { hsum256(self.0) }
    }
}

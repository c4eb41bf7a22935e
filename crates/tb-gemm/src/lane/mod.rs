//! Vector register abstractions the engines are generic over.
//!
//! A lane type is one native vector of f32 accumulators. Engines only see
//! these traits, so each hardware generation is a single impl block.

use tb_quant::QK;

pub mod portable;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

#[cfg(target_arch = "aarch64")]
pub mod neon;

/// One vector of f32 accumulators.
pub trait Lane: Copy {
    /// f32 values per vector.
    const WIDTH: usize;
    /// Largest output tile (rows of A × rows of B) kept in registers.
    const MR: usize;
    const NR: usize;

    fn zero() -> Self;

    /// `a * b + acc` with a single rounding.
    fn madd(a: Self, b: Self, acc: Self) -> Self;

    /// Sum of all lanes, reduced as a balanced binary tree.
    fn hsum(self) -> f32;
}

/// Loads `WIDTH` consecutive values of `T`, decoded to f32.
pub trait Load<T>: Lane {
    /// # Panics
    /// Panics if `src` holds fewer than `WIDTH` values.
    fn load(src: &[T]) -> Self;
}

/// Accumulator for products of 32-value blocks of signed 8-bit integers.
pub trait DotLane: Copy {
    const MR: usize;
    const NR: usize;

    fn zero() -> Self;

    /// `acc + scale * dot(a, b)`, where the integer dot product is exact.
    fn dot_madd(a: &[i8; QK], b: &[i8; QK], scale: f32, acc: Self) -> Self;

    /// Sum of all partial accumulators, reduced as a balanced binary tree.
    fn hsum(self) -> f32;
}

/// Pairwise (ruler-order) reduction of a power-of-two sized array.
#[inline(always)]
pub(crate) fn tree_sum<const W: usize>(mut v: [f32; W]) -> f32 {
    debug_assert!(W.is_power_of_two());
    let mut width = W;
    while width > 1 {
        width /= 2;
        for i in 0..width {
            v[i] += v[i + width];
        }
    }
    v[0]
}

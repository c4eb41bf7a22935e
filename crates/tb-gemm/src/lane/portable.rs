//! Target-independent lanes built on fixed-size arrays.
//!
//! Compiled inside a `#[target_feature]` function these lower to the wide
//! registers of that feature set; on their own they run on any CPU.

use std::array;

use tb_quant::{FloatElement, QK};

use super::{tree_sum, DotLane, Lane, Load};

/// `W` f32 values; `W` must be a power of two.
#[derive(Debug, Clone, Copy)]
pub struct Portable<const W: usize>(pub [f32; W]);

impl<const W: usize> Lane for Portable<W> {
    const WIDTH: usize = W;
    const MR: usize = if W >= 16 { 5 } else { 4 };
    const NR: usize = if W >= 16 { 5 } else { 3 };

    #[inline(always)]
    fn zero() -> Self {
        Portable([0.0; W])
    }

    #[inline(always)]
    fn madd(a: Self, b: Self, acc: Self) -> Self {
        Portable(array::from_fn(|i| a.0[i].mul_add(b.0[i], acc.0[i])))
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        tree_sum(self.0)
    }
}

impl<T: FloatElement, const W: usize> Load<T> for Portable<W> {
    #[inline(always)]
    fn load(src: &[T]) -> Self {
        let src = &src[..W];
        Portable(array::from_fn(|i| src[i].to_f32()))
    }
}

/// Eight partial sums, each over four adjacent products, mirroring the lane
/// layout of the 256-bit integer kernels.
#[derive(Debug, Clone, Copy)]
pub struct PortableDot(pub [f32; 8]);

impl DotLane for PortableDot {
    const MR: usize = 4;
    const NR: usize = 4;

    #[inline(always)]
    fn zero() -> Self {
        PortableDot([0.0; 8])
    }

    #[inline(always)]
    fn dot_madd(a: &[i8; QK], b: &[i8; QK], scale: f32, acc: Self) -> Self {
        PortableDot(array::from_fn(|l| {
            let s: i32 = (4 * l..4 * l + 4).map(|t| a[t] as i32 * b[t] as i32).sum();
            scale.mul_add(s as f32, acc.0[l])
        }))
    }

    #[inline(always)]
    fn hsum(self) -> f32 {
        tree_sum(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    #[test]
    fn test_madd_and_hsum() {
        let a = Portable::<8>([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = Portable::<8>([1.0; 8]);
        let acc = Portable::madd(a, b, Portable::zero());
        assert_eq!(acc.hsum(), 36.0);
    }

    #[test]
    fn test_load_decodes() {
        let src: Vec<f16> = (0..16).map(|i| f16::from_f32(i as f32)).collect();
        let v = <Portable<16> as Load<f16>>::load(&src);
        assert_eq!(v.0[15], 15.0);
        assert_eq!(v.hsum(), 120.0);
    }

    #[test]
    #[should_panic]
    fn test_short_load_panics() {
        let src = [1.0f32; 4];
        let _ = <Portable<8> as Load<f32>>::load(&src);
    }

    #[test]
    fn test_dot_madd() {
        let mut a = [0i8; QK];
        let mut b = [0i8; QK];
        for i in 0..QK {
            a[i] = i as i8 - 16;
            b[i] = if i % 2 == 0 { 3 } else { -2 };
        }
        let expected: i32 = a.iter().zip(&b).map(|(&x, &y)| x as i32 * y as i32).sum();
        let acc = PortableDot::dot_madd(&a, &b, 0.5, PortableDot::zero());
        assert_eq!(acc.hsum(), expected as f32 * 0.5);
    }

    #[test]
    fn test_tile_limits() {
        assert_eq!(<Portable<8> as Lane>::MR, 4);
        assert_eq!(<Portable<16> as Lane>::NR, 5);
    }
}

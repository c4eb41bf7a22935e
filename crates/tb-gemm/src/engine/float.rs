//! Floating-point tiles: f32, f16 and bf16 operands with f32 accumulation.

use std::array;
use std::marker::PhantomData;

use tb_quant::FloatElement;

use super::TileKernel;
use crate::lane::{Lane, Load};
use crate::request::SharedOutput;

/// Multiplies rows of `a` against rows of `b` with lane type `V`.
///
/// The first `k / WIDTH * WIDTH` values of every dot product are reduced with
/// fused multiply-adds in vector registers, the remainder one value at a time.
pub struct FloatKernel<'a, V, TA, TB> {
    a: &'a [TA],
    lda: usize,
    b: &'a [TB],
    ldb: usize,
    k: usize,
    _lane: PhantomData<fn() -> V>,
}

impl<'a, V, TA, TB> FloatKernel<'a, V, TA, TB> {
    pub fn new(a: &'a [TA], lda: usize, b: &'a [TB], ldb: usize, k: usize) -> Self {
        Self {
            a,
            lda,
            b,
            ldb,
            k,
            _lane: PhantomData,
        }
    }
}

impl<V, TA, TB> TileKernel for FloatKernel<'_, V, TA, TB>
where
    V: Load<TA> + Load<TB>,
    TA: FloatElement,
    TB: FloatElement,
{
    const MR: usize = <V as Lane>::MR;
    const NR: usize = <V as Lane>::NR;

    #[inline(always)]
    fn tile<const RM: usize, const RN: usize>(&self, out: &SharedOutput<'_>, ii: usize, jj: usize) {
        let width = <V as Lane>::WIDTH;
        let kv = self.k / width * width;
        let rows_a: [&[TA]; RM] = array::from_fn(|i| &self.a[self.lda * (ii + i)..][..self.k]);
        let rows_b: [&[TB]; RN] = array::from_fn(|j| &self.b[self.ldb * (jj + j)..][..self.k]);

        let mut acc = [[<V as Lane>::zero(); RM]; RN];
        let mut l = 0;
        while l < kv {
            let av: [V; RM] = array::from_fn(|i| <V as Load<TA>>::load(&rows_a[i][l..]));
            for j in 0..RN {
                let bv = <V as Load<TB>>::load(&rows_b[j][l..]);
                for i in 0..RM {
                    acc[j][i] = V::madd(av[i], bv, acc[j][i]);
                }
            }
            l += width;
        }

        for j in 0..RN {
            for i in 0..RM {
                let mut sum = acc[j][i].hsum();
                for l in kv..self.k {
                    sum = rows_a[i][l].to_f32().mul_add(rows_b[j][l].to_f32(), sum);
                }
                out.write(ii + i, jj + j, sum);
            }
        }
    }
}

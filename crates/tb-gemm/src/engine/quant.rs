//! Block-quantized tiles: 4/5/8-bit A blocks against 8-bit B blocks.

use std::array;
use std::marker::PhantomData;

use tb_quant::{DotBlock, QuantBlock, QK};

use super::TileKernel;
use crate::lane::DotLane;
use crate::request::SharedOutput;

/// Multiplies block rows of `a` against block rows of `b`; `k` counts blocks.
///
/// Each pair of blocks contributes `d_a * d_b * dot(q_a, q_b)`. Encodings with
/// a per-block minimum additionally contribute `m_a * s_b`.
pub struct QuantKernel<'a, V, TA, TB> {
    a: &'a [TA],
    lda: usize,
    b: &'a [TB],
    ldb: usize,
    k: usize,
    _lane: PhantomData<fn() -> V>,
}

impl<'a, V, TA, TB> QuantKernel<'a, V, TA, TB> {
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

impl<V, TA, TB> TileKernel for QuantKernel<'_, V, TA, TB>
where
    V: DotLane,
    TA: QuantBlock,
    TB: DotBlock,
{
    const MR: usize = V::MR;
    const NR: usize = V::NR;

    #[inline(always)]
    fn tile<const RM: usize, const RN: usize>(&self, out: &SharedOutput<'_>, ii: usize, jj: usize) {
        let rows_a: [&[TA]; RM] = array::from_fn(|i| &self.a[self.lda * (ii + i)..][..self.k]);
        let rows_b: [&[TB]; RN] = array::from_fn(|j| &self.b[self.ldb * (jj + j)..][..self.k]);

        let mut acc = [[V::zero(); RM]; RN];
        let mut bias = [[0.0f32; RM]; RN];
        let mut qa = [[0i8; QK]; RM];
        for l in 0..self.k {
            let mut da = [0.0f32; RM];
            let mut ma = [0.0f32; RM];
            for i in 0..RM {
                let block = &rows_a[i][l];
                block.unpack(&mut qa[i]);
                da[i] = block.scale();
                if TA::HAS_OFFSET {
                    ma[i] = block.offset();
                }
            }
            for j in 0..RN {
                let block = &rows_b[j][l];
                let db = block.scale();
                for i in 0..RM {
                    acc[j][i] = V::dot_madd(&qa[i], block.quants(), da[i] * db, acc[j][i]);
                }
                if TA::HAS_OFFSET {
                    let sb = block.scaled_sum();
                    for i in 0..RM {
                        bias[j][i] = ma[i].mul_add(sb, bias[j][i]);
                    }
                }
            }
        }

        for j in 0..RN {
            for i in 0..RM {
                out.write(ii + i, jj + j, acc[j][i].hsum() + bias[j][i]);
            }
        }
    }
}

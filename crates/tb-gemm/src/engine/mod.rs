//! Register-tiled multiply over one thread's band of C.
//!
//! A band is covered by at most four rectangles: the largest grid of full
//! `MR x NR` tiles, the leftover rows under it, the leftover columns beside it,
//! and the corner. Each rectangle is stepped with one fixed tile shape, so the
//! accumulators of every tile live in registers for the whole reduction.

use crate::partition::Band;
use crate::request::SharedOutput;

pub mod float;
pub mod quant;

pub use float::FloatKernel;
pub use quant::QuantKernel;

/// Largest tile edge any kernel is instantiated with.
pub const MAX_TILE: usize = 5;

/// Computes `RM x RN` output tiles.
pub trait TileKernel: Sync {
    /// Preferred tile rows (rows of A).
    const MR: usize;
    /// Preferred tile columns (rows of B).
    const NR: usize;

    /// Computes and stores the full reduction for output rows
    /// `ii..ii + RM` of columns `jj..jj + RN`.
    fn tile<const RM: usize, const RN: usize>(&self, out: &SharedOutput<'_>, ii: usize, jj: usize);
}

/// Computes every element of `band` exactly once.
#[inline(always)]
pub fn run<K: TileKernel>(kernel: &K, out: &SharedOutput<'_>, band: Band) {
    if band.is_empty() {
        return;
    }
    let Band { m0, m1, n0, n1 } = band;
    let mc = band.rows().min(K::MR).min(MAX_TILE).max(1);
    let nc = band.cols().min(K::NR).min(MAX_TILE).max(1);
    let mp = m0 + band.rows() / mc * mc;
    let np = n0 + band.cols() / nc * nc;

    let regions = [
        (mc, nc, Band { m0, m1: mp, n0, n1: np }),
        (m1 - mp, nc, Band { m0: mp, m1, n0, n1: np }),
        (mc, n1 - np, Band { m0, m1: mp, n0: np, n1 }),
        (m1 - mp, n1 - np, Band { m0: mp, m1, n0: np, n1 }),
    ];
    for (rm, rn, region) in regions {
        if !region.is_empty() {
            step(kernel, out, rm, rn, region);
        }
    }
}

macro_rules! step_shapes {
    ($kernel:ident, $out:ident, $rm:ident, $rn:ident, $region:ident;
     $(($r:literal, $c:literal)),* $(,)?) => {
        match ($rm, $rn) {
            $(($r, $c) => gemm::<K, $r, $c>($kernel, $out, $region),)*
            _ => gemm::<K, 1, 1>($kernel, $out, $region),
        }
    };
}

/// Steps `region` with `rm x rn` tiles; both must divide the region.
#[inline(always)]
fn step<K: TileKernel>(kernel: &K, out: &SharedOutput<'_>, rm: usize, rn: usize, region: Band) {
    step_shapes!(kernel, out, rm, rn, region;
        (1, 1), (1, 2), (1, 3), (1, 4), (1, 5),
        (2, 1), (2, 2), (2, 3), (2, 4), (2, 5),
        (3, 1), (3, 2), (3, 3), (3, 4), (3, 5),
        (4, 1), (4, 2), (4, 3), (4, 4), (4, 5),
        (5, 1), (5, 2), (5, 3), (5, 4), (5, 5),
    )
}

#[inline(always)]
fn gemm<K: TileKernel, const RM: usize, const RN: usize>(
    kernel: &K,
    out: &SharedOutput<'_>,
    region: Band,
) {
    let ytiles = region.rows() / RM;
    let xtiles = region.cols() / RN;
    for y in 0..ytiles {
        let ii = region.m0 + y * RM;
        for x in 0..xtiles {
            kernel.tile::<RM, RN>(out, ii, region.n0 + x * RN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how often each element is produced and records the tile shapes.
    struct Counting {
        hits: Vec<AtomicUsize>,
        ldc: usize,
    }

    impl TileKernel for Counting {
        const MR: usize = 4;
        const NR: usize = 3;

        fn tile<const RM: usize, const RN: usize>(&self, out: &SharedOutput<'_>, ii: usize, jj: usize) {
            assert!(RM <= Self::MR && RN <= Self::NR);
            for j in 0..RN {
                for i in 0..RM {
                    self.hits[self.ldc * (jj + j) + ii + i].fetch_add(1, Ordering::Relaxed);
                    out.write(ii + i, jj + j, (RM * 10 + RN) as f32);
                }
            }
        }
    }

    fn cover(m: usize, n: usize, band: Band) -> Vec<usize> {
        let kernel = Counting {
            hits: (0..m * n).map(|_| AtomicUsize::new(0)).collect(),
            ldc: m,
        };
        let mut c = vec![0.0f32; m * n];
        run(&kernel, &SharedOutput::new(&mut c, m), band);
        kernel.hits.iter().map(|h| h.load(Ordering::Relaxed)).collect()
    }

    #[test]
    fn test_every_element_once() {
        for m in [1, 3, 4, 5, 9, 17] {
            for n in [1, 2, 3, 7, 12] {
                let hits = cover(m, n, Band { m0: 0, m1: m, n0: 0, n1: n });
                assert!(hits.iter().all(|&h| h == 1), "m={m} n={n}: {hits:?}");
            }
        }
    }

    #[test]
    fn test_band_bounds_respected() {
        let (m, n) = (11, 7);
        let band = Band { m0: 2, m1: 9, n0: 1, n1: 6 };
        let hits = cover(m, n, band);
        for j in 0..n {
            for i in 0..m {
                let inside = (2..9).contains(&i) && (1..6).contains(&j);
                assert_eq!(hits[m * j + i], usize::from(inside), "({i}, {j})");
            }
        }
    }

    #[test]
    fn test_full_tiles_used_where_possible() {
        let (m, n) = (8, 6);
        let kernel = Counting {
            hits: (0..m * n).map(|_| AtomicUsize::new(0)).collect(),
            ldc: m,
        };
        let mut c = vec![0.0f32; m * n];
        run(&kernel, &SharedOutput::new(&mut c, m), Band { m0: 0, m1: m, n0: 0, n1: n });
        assert!(c.iter().all(|&v| v == 43.0));
    }

    #[test]
    fn test_empty_band_writes_nothing() {
        let hits = cover(4, 4, Band { m0: 2, m1: 2, n0: 0, n1: 4 });
        assert!(hits.iter().all(|&h| h == 0));
    }
}

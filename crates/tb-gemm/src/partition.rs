/// Rectangle of output elements owned by one thread: rows `m0..m1` of
/// columns `n0..n1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub m0: usize,
    pub m1: usize,
    pub n0: usize,
    pub n1: usize,
}

impl Band {
    pub fn is_empty(&self) -> bool {
        self.m0 >= self.m1 || self.n0 >= self.n1
    }

    pub fn rows(&self) -> usize {
        self.m1.saturating_sub(self.m0)
    }

    pub fn cols(&self) -> usize {
        self.n1.saturating_sub(self.n0)
    }
}

/// Splits the larger output dimension into `nth` contiguous ranges and
/// returns the one owned by thread `ith`.
///
/// Range sizes differ by at most one, so the union over all `ith` covers the
/// dimension exactly once.
pub fn partition(m: usize, n: usize, ith: usize, nth: usize) -> Band {
    debug_assert!(nth > 0 && ith < nth);
    if m >= n {
        let (m0, m1) = split(m, ith, nth);
        Band { m0, m1, n0: 0, n1: n }
    } else {
        let (n0, n1) = split(n, ith, nth);
        Band { m0: 0, m1: m, n0, n1 }
    }
}

fn split(len: usize, ith: usize, nth: usize) -> (usize, usize) {
    let base = len / nth;
    let extra = len % nth;
    let start = ith * base + ith.min(extra);
    let size = base + usize::from(ith < extra);
    (start, start + size)
}

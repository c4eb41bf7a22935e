use std::marker::PhantomData;

use tb_quant::{Encoding, Operand};

use crate::error::{GemmError, Result};

/// Geometry and operands of one multiply.
///
/// Computes `C[ldc*j + i] = dot(A row i, B row j)` for `i < m`, `j < n`: A is
/// read transposed (`m` rows of `k` units), B in natural order (`n` rows).
///
/// `k`, `lda` and `ldb` count storage units of their operand: elements for
/// floating encodings, 32-value blocks for quantized ones. `k` is measured in
/// A's units; B rows must span the same number of values.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub a: Operand<'a>,
    pub lda: usize,
    pub b: Operand<'a>,
    pub ldb: usize,
    pub ldc: usize,
    /// Encoding the caller wants C materialized in.
    pub c_type: Encoding,
    pub ith: usize,
    pub nth: usize,
}

impl<'a> Request<'a> {
    /// Creates a validated single-thread request with f32 output.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        m: usize,
        n: usize,
        k: usize,
        a: Operand<'a>,
        lda: usize,
        b: Operand<'a>,
        ldb: usize,
        ldc: usize,
    ) -> Result<Self> {
        let req = Request {
            m,
            n,
            k,
            a,
            lda,
            b,
            ldb,
            ldc,
            c_type: Encoding::F32,
            ith: 0,
            nth: 1,
        };
        req.validate()?;
        Ok(req)
    }

    /// Returns a copy assigned to thread `ith` of `nth`.
    pub fn for_thread(self, ith: usize, nth: usize) -> Result<Self> {
        if nth == 0 || ith >= nth {
            return Err(GemmError::InvalidThread { ith, nth });
        }
        Ok(Request { ith, nth, ..self })
    }

    /// Returns a copy that asks for C in `c_type`.
    pub fn with_output_type(self, c_type: Encoding) -> Self {
        Request { c_type, ..self }
    }

    /// Reduction length in B's storage units.
    pub fn k_b(&self) -> Result<usize> {
        let values = self
            .k
            .checked_mul(self.a.encoding().block_size())
            .ok_or(GemmError::GeometryOverflow { what: "k" })?;
        let block = self.b.encoding().block_size();
        if values % block != 0 {
            return Err(GemmError::ReductionMismatch {
                k: self.k,
                a: self.a.encoding(),
                b: self.b.encoding(),
            });
        }
        Ok(values / block)
    }

    /// Checks strides, thread assignment and operand lengths.
    pub fn validate(&self) -> Result<()> {
        let k_b = self.k_b()?;
        if self.lda < self.k {
            return Err(GemmError::InvalidStride {
                name: "lda",
                stride: self.lda,
                k: self.k,
            });
        }
        if self.ldb < k_b {
            return Err(GemmError::InvalidStride {
                name: "ldb",
                stride: self.ldb,
                k: k_b,
            });
        }
        if self.ldc < self.m {
            return Err(GemmError::InvalidOutputStride {
                ldc: self.ldc,
                m: self.m,
            });
        }
        if self.nth == 0 || self.ith >= self.nth {
            return Err(GemmError::InvalidThread {
                ith: self.ith,
                nth: self.nth,
            });
        }
        check_len("A", self.a.len(), span("A", self.m, self.lda, self.k)?)?;
        check_len("B", self.b.len(), span("B", self.n, self.ldb, k_b)?)?;
        self.output_len()?;
        Ok(())
    }

    /// Minimum C length in f32 elements.
    pub fn output_len(&self) -> Result<usize> {
        span("C", self.n, self.ldc, self.m)
    }
}

/// Units needed to hold `rows` rows of `width` with stride `ld`.
///
/// Fails when the extent does not fit in `usize`.
pub fn span(what: &'static str, rows: usize, ld: usize, width: usize) -> Result<usize> {
    if rows == 0 || width == 0 {
        return Ok(0);
    }
    ld.checked_mul(rows - 1)
        .and_then(|v| v.checked_add(width))
        .ok_or(GemmError::GeometryOverflow { what })
}

pub(crate) fn check_len(operand: &'static str, len: usize, required: usize) -> Result<()> {
    if len < required {
        return Err(GemmError::BufferTooSmall {
            operand,
            len,
            required,
        });
    }
    Ok(())
}

/// The output matrix shared by all threads of one multiply.
///
/// Each thread writes only the elements of its own partition, so no two
/// threads ever touch the same element.
#[derive(Debug)]
pub struct SharedOutput<'a> {
    ptr: *mut f32,
    len: usize,
    ldc: usize,
    _marker: PhantomData<&'a mut [f32]>,
}

// SAFETY: writes go through `write`, and callers of the shared dispatch path
// guarantee disjoint element sets per thread.
unsafe impl Send for SharedOutput<'_> {}
unsafe impl Sync for SharedOutput<'_> {}

impl<'a> SharedOutput<'a> {
    /// Wraps an exclusively borrowed buffer.
    pub fn new(c: &'a mut [f32], ldc: usize) -> Self {
        SharedOutput {
            ptr: c.as_mut_ptr(),
            len: c.len(),
            ldc,
            _marker: PhantomData,
        }
    }

    /// Wraps a raw buffer.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `len` f32 values for `'a`, and nothing
    /// else may read or write the elements the multiply produces meanwhile.
    pub unsafe fn from_raw_parts(ptr: *mut f32, len: usize, ldc: usize) -> Self {
        SharedOutput {
            ptr,
            len,
            ldc,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn ldc(&self) -> usize {
        self.ldc
    }

    /// Stores output element (i, j).
    #[inline(always)]
    pub(crate) fn write(&self, i: usize, j: usize, value: f32) {
        let idx = self.ldc * j + i;
        assert!(idx < self.len, "output index {idx} out of bounds ({})", self.len);
        // SAFETY: in bounds per the check above; exclusivity per the type invariant.
        unsafe { self.ptr.add(idx).write(value) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_strides() {
        let a = vec![0.0f32; 8];
        let b = vec![0.0f32; 8];
        assert!(Request::new(2, 2, 4, Operand::F32(&a), 4, Operand::F32(&b), 4, 2).is_ok());
        assert!(matches!(
            Request::new(2, 2, 4, Operand::F32(&a), 3, Operand::F32(&b), 4, 2),
            Err(GemmError::InvalidStride { name: "lda", .. })
        ));
        assert!(matches!(
            Request::new(2, 2, 4, Operand::F32(&a), 4, Operand::F32(&b), 4, 1),
            Err(GemmError::InvalidOutputStride { .. })
        ));
        assert!(matches!(
            Request::new(3, 2, 4, Operand::F32(&a), 4, Operand::F32(&b), 4, 3),
            Err(GemmError::BufferTooSmall { operand: "A", .. })
        ));
    }

    #[test]
    fn test_thread_assignment() {
        let a = vec![0.0f32; 4];
        let req = Request::new(1, 1, 4, Operand::F32(&a), 4, Operand::F32(&a), 4, 1).unwrap();
        assert!(req.for_thread(3, 4).is_ok());
        assert!(req.for_thread(4, 4).is_err());
        assert!(req.for_thread(0, 0).is_err());
    }

    #[test]
    fn test_mixed_units() {
        // One Q8_0 block of A against 32 f32 values of B.
        let blocks = vec![tb_quant::BlockQ8_0 { d: half::f16::ZERO, qs: [0; 32] }; 2];
        let b = vec![0.0f32; 64];
        let req = Request::new(2, 2, 1, Operand::Q8_0(&blocks), 1, Operand::F32(&b), 32, 2).unwrap();
        assert_eq!(req.k_b().unwrap(), 32);
        assert_eq!(req.output_len().unwrap(), 4);
    }

    #[test]
    fn test_reduction_mismatch() {
        let a = vec![0.0f32; 16];
        let blocks = vec![tb_quant::BlockQ8_0 { d: half::f16::ZERO, qs: [0; 32] }; 1];
        assert!(matches!(
            Request::new(1, 1, 16, Operand::F32(&a), 16, Operand::Q8_0(&blocks), 1, 1),
            Err(GemmError::ReductionMismatch { .. })
        ));
    }

    #[test]
    fn test_degenerate_spans() {
        assert_eq!(span("A", 0, 10, 4).unwrap(), 0);
        assert_eq!(span("A", 3, 10, 0).unwrap(), 0);
        assert_eq!(span("A", 3, 10, 4).unwrap(), 24);
        assert!(matches!(
            span("B", 3, usize::MAX / 2 + 1, 4),
            Err(GemmError::GeometryOverflow { what: "B" })
        ));
        assert!(matches!(
            span("C", 2, usize::MAX - 2, 4),
            Err(GemmError::GeometryOverflow { what: "C" })
        ));
    }

    #[test]
    #[should_panic]
    fn test_write_out_of_bounds_panics() {
        let mut c = vec![0.0f32; 4];
        let out = SharedOutput::new(&mut c, 2);
        out.write(0, 2, 1.0);
    }
}

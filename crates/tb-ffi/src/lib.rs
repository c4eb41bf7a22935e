//! `tb-ffi` - C ABI for the tinyblas matrix multiply.
//!
//! The entry points mirror the GGML `llamafile_sgemm` contract: raw buffers,
//! GGML type ids and a thread index. A `false`/non-handled result means the
//! caller must run its own multiply.

mod error;
mod types;

pub use error::*;
pub use types::*;

use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};

use tb_gemm::request::span;
use tb_gemm::{Dispatcher, Outcome, Request, SharedOutput};
use tb_quant::{Encoding, Operand};
use tracing_subscriber::EnvFilter;

/// Execute a closure that returns a `TbStatus`, catching any panics
/// and converting them into `TbStatus::ErrorInternal`.
fn catch_panic<F: FnOnce() -> TbStatus + std::panic::UnwindSafe>(f: F) -> TbStatus {
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(_) => {
            set_last_error("internal panic".to_string());
            TbStatus::ErrorInternal
        }
    }
}

/// Raw arguments of one `tb_sgemm` call.
#[derive(Clone, Copy)]
struct RawSgemm {
    m: i64,
    n: i64,
    k: i64,
    a: *const c_void,
    lda: i64,
    b: *const c_void,
    ldb: i64,
    c: *mut c_void,
    ldc: i64,
    ith: c_int,
    nth: c_int,
    a_type: c_int,
    b_type: c_int,
    c_type: c_int,
}

fn dim(name: &str, value: i64) -> Result<usize, String> {
    usize::try_from(value).map_err(|_| format!("{name}={value} is negative"))
}

fn encoding(tag: c_int) -> Option<Encoding> {
    u32::try_from(tag).ok().and_then(Encoding::from_gguf_type)
}

/// Views `units` storage units of `encoding` at `ptr`.
///
/// # Safety
/// `ptr` must be valid for reads of `units` units for `'a`.
unsafe fn operand<'a>(
    name: &str,
    encoding: Encoding,
    ptr: *const c_void,
    units: usize,
) -> Result<Operand<'a>, String> {
    if units == 0 {
        return Ok(Operand::empty(encoding));
    }
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    let len = units
        .checked_mul(encoding.size_in_bytes())
        .ok_or_else(|| format!("{name} extent overflows"))?;
    let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
    Operand::from_bytes(encoding, bytes).map_err(|e| format!("{name}: {e}"))
}

impl RawSgemm {
    /// Validates the arguments and runs the dispatcher.
    ///
    /// Unknown type ids are not errors: they are simply not supported.
    ///
    /// # Safety
    /// See [`tb_sgemm`].
    unsafe fn run(self) -> Result<Outcome, String> {
        let (m, n, k) = (dim("m", self.m)?, dim("n", self.n)?, dim("k", self.k)?);
        let (lda, ldb, ldc) = (dim("lda", self.lda)?, dim("ldb", self.ldb)?, dim("ldc", self.ldc)?);
        if self.nth <= 0 || self.ith < 0 || self.ith >= self.nth {
            return Err(format!("invalid thread assignment ith={} nth={}", self.ith, self.nth));
        }
        let (Some(ea), Some(eb), Some(ec)) = (
            encoding(self.a_type),
            encoding(self.b_type),
            encoding(self.c_type),
        ) else {
            tracing::trace!(a_type = self.a_type, b_type = self.b_type, c_type = self.c_type, "unknown type id");
            return Ok(Outcome::NotSupported);
        };

        let values = k
            .checked_mul(ea.block_size())
            .ok_or_else(|| format!("k={k} overflows"))?;
        if values % eb.block_size() != 0 {
            return Err(format!("k={k} {ea} units do not span whole {eb} units"));
        }
        let k_b = values / eb.block_size();
        let a = operand("A", ea, self.a, span("A", m, lda, k).map_err(|e| e.to_string())?)?;
        let b = operand("B", eb, self.b, span("B", n, ldb, k_b).map_err(|e| e.to_string())?)?;

        let c_len = span("C", n, ldc, m).map_err(|e| e.to_string())?;
        if c_len > 0 && (self.c.is_null() || (self.c as usize) % std::mem::align_of::<f32>() != 0) {
            return Err("C is null or misaligned".to_string());
        }
        let req = Request::new(m, n, k, a, lda, b, ldb, ldc)
            .and_then(|req| req.for_thread(self.ith as usize, self.nth as usize))
            .map(|req| req.with_output_type(ec))
            .map_err(|e| e.to_string())?;

        let c = if c_len == 0 {
            std::ptr::NonNull::<f32>::dangling().as_ptr()
        } else {
            self.c as *mut f32
        };
        let out = SharedOutput::from_raw_parts(c, c_len, ldc);
        Ok(Dispatcher::global().dispatch_shared(&req, &out))
    }
}

/// Multiply with the detailed outcome written to `*outcome`.
///
/// Computes `C[ldc*j + i] = dot(A row i, B row j)` for this thread's part of
/// the output. `k`, `lda` and `ldb` count storage units (blocks for quantized
/// types); type ids are GGML's.
///
/// # Safety
/// `a`, `b` and `c` must be valid for the extents implied by the geometry.
/// Concurrent calls sharing `c` must use the same geometry and distinct
/// `ith`, and nothing else may access C until they all return.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn tb_sgemm_outcome(
    m: i64,
    n: i64,
    k: i64,
    a: *const c_void,
    lda: i64,
    b: *const c_void,
    ldb: i64,
    c: *mut c_void,
    ldc: i64,
    ith: c_int,
    nth: c_int,
    a_type: c_int,
    b_type: c_int,
    c_type: c_int,
    outcome: *mut TbOutcome,
) -> TbStatus {
    let raw = RawSgemm {
        m,
        n,
        k,
        a,
        lda,
        b,
        ldb,
        c,
        ldc,
        ith,
        nth,
        a_type,
        b_type,
        c_type,
    };
    catch_panic(move || {
        if outcome.is_null() {
            set_last_error("outcome is null".to_string());
            return TbStatus::ErrorInvalidArgument;
        }
        match unsafe { raw.run() } {
            Ok(result) => {
                unsafe { *outcome = result.into() };
                TbStatus::Ok
            }
            Err(msg) => {
                set_last_error(msg);
                TbStatus::ErrorInvalidArgument
            }
        }
    })
}

/// Multiply; returns true if this thread's part of C has been written.
///
/// # Safety
/// Same as [`tb_sgemm_outcome`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn tb_sgemm(
    m: i64,
    n: i64,
    k: i64,
    a: *const c_void,
    lda: i64,
    b: *const c_void,
    ldb: i64,
    c: *mut c_void,
    ldc: i64,
    ith: c_int,
    nth: c_int,
    a_type: c_int,
    b_type: c_int,
    c_type: c_int,
) -> bool {
    let mut outcome = TbOutcome::default();
    let status = tb_sgemm_outcome(
        m, n, k, a, lda, b, ldb, c, ldc, ith, nth, a_type, b_type, c_type, &mut outcome,
    );
    status == TbStatus::Ok && outcome.kind == TbOutcomeKind::Handled
}

/// Vector tier the floating-point kernels run on in this process.
#[no_mangle]
pub extern "C" fn tb_cpu_tier() -> TbTier {
    std::panic::catch_unwind(|| Dispatcher::global().float_tier().into())
        .unwrap_or(TbTier::Unavailable)
}

/// Installs a stderr logger filtered by `TINYBLAS_LOG` (default `warn`).
///
/// Returns `TbStatus::Ok` if a global logger is already installed.
#[no_mangle]
pub extern "C" fn tb_log_init() -> TbStatus {
    catch_panic(|| {
        let filter = EnvFilter::try_from_env("TINYBLAS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        if installed.is_err() {
            tracing::debug!("logger already installed");
        }
        TbStatus::Ok
    })
}

/// Retrieve the last error message on this thread.
///
/// Returns null if no error has occurred. The caller must free the string
/// with `tb_free_string`.
#[no_mangle]
pub extern "C" fn tb_last_error() -> *const c_char {
    match error::take_last_error() {
        Some(e) => e.into_raw(),
        None => std::ptr::null(),
    }
}

/// Free a string previously returned by `tb_last_error`.
#[no_mangle]
pub unsafe extern "C" fn tb_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

//! Kernel dispatcher: decides whether, and with which kernel, a request is
//! computed here.

use std::fmt;
use std::sync::OnceLock;

use tb_quant::{Encoding, Operand};

use crate::config::DispatchConfig;
use crate::cpu_features::CpuFeatures;
use crate::error::Result;
use crate::partition::{partition, Band};
use crate::request::{check_len, Request, SharedOutput};
use crate::tier::Tier;

pub mod table;

pub use table::{KernelFn, KernelTable};

/// Result of a dispatch attempt. Only `Handled` means C was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// This thread's part of C has been computed.
    Handled,
    /// No kernel exists for the encodings on this host.
    NotSupported,
    /// A kernel exists but is slower than the caller's generic path for this
    /// shape.
    NotProfitable,
    /// A kernel becomes available once B is converted to the given encoding.
    WantsQuantization(Encoding),
}

impl Outcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Outcome::Handled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Handled => f.write_str("handled"),
            Outcome::NotSupported => f.write_str("not supported"),
            Outcome::NotProfitable => f.write_str("not profitable"),
            Outcome::WantsQuantization(enc) => write!(f, "wants quantization to {enc}"),
        }
    }
}

/// What the dispatcher would do with a request.
#[derive(Debug, Clone, Copy)]
pub enum Plan {
    Run(KernelFn),
    Decline(Outcome),
}

/// Resolved kernel table plus the policy used to pick between entries.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    table: KernelTable,
    config: DispatchConfig,
}

static GLOBAL: OnceLock<Dispatcher> = OnceLock::new();

impl Dispatcher {
    /// The process-wide dispatcher, configured from the environment on first
    /// use.
    pub fn global() -> &'static Dispatcher {
        GLOBAL.get_or_init(|| {
            let config = DispatchConfig::from_env().unwrap_or_else(|err| {
                tracing::warn!(%err, "invalid dispatch configuration, using defaults");
                DispatchConfig::default()
            });
            Dispatcher::new(config)
        })
    }

    /// Builds a dispatcher for this host with the given policy.
    pub fn new(config: DispatchConfig) -> Dispatcher {
        let table = KernelTable::build(CpuFeatures::get(), &config);
        Dispatcher { table, config }
    }

    pub fn table(&self) -> &KernelTable {
        &self.table
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Tier of the floating-point kernels, `None` if none are available.
    pub fn float_tier(&self) -> Option<Tier> {
        self.table.float_tier()
    }

    /// Decides how `req` would be handled without touching any memory.
    pub fn plan(&self, req: &Request<'_>) -> Plan {
        if req.c_type != Encoding::F32 {
            return Plan::Decline(Outcome::NotSupported);
        }
        let (a, b) = (req.a.encoding(), req.b.encoding());
        let kernel = self.table.get(a, b);

        if let Some(kernel) = kernel {
            if req.m == 0 || req.n == 0 {
                return Plan::Run(kernel);
            }
        }

        if a.is_float() && a != Encoding::F32 {
            if b == a && kernel.is_some() && req.n < self.config.half_min_cols {
                return Plan::Decline(Outcome::NotProfitable);
            }
            if b == Encoding::F32 && req.n > self.config.promote_max_cols {
                return self.wants(a, a);
            }
        }
        if a.is_quantized() && b.is_float() {
            return self.wants(a, a.vec_dot_type());
        }

        match kernel {
            Some(kernel) => Plan::Run(kernel),
            None => Plan::Decline(Outcome::NotSupported),
        }
    }

    fn wants(&self, a: Encoding, target: Encoding) -> Plan {
        if self.table.contains(a, target) {
            Plan::Decline(Outcome::WantsQuantization(target))
        } else {
            Plan::Decline(Outcome::NotSupported)
        }
    }

    /// Computes this thread's part of C.
    ///
    /// # Errors
    /// Returns an error if the request geometry is invalid or `c` is shorter
    /// than `req.output_len()`. Declined requests are not errors; C is left
    /// untouched for them.
    pub fn dispatch(&self, req: &Request<'_>, c: &mut [f32]) -> Result<Outcome> {
        req.validate()?;
        check_len("C", c.len(), req.output_len()?)?;
        let out = SharedOutput::new(c, req.ldc);
        // SAFETY: `out` borrows `c` exclusively for this single call.
        Ok(unsafe { self.dispatch_shared(req, &out) })
    }

    /// Computes this thread's part of C into an output shared by `req.nth`
    /// concurrent calls.
    ///
    /// # Safety
    /// Concurrent calls on the same output must use the same geometry and
    /// distinct `ith` values, and nothing else may access the elements of C
    /// the multiply produces until they return.
    ///
    /// # Panics
    /// Panics if the request is invalid or writes fall outside `out`.
    pub unsafe fn dispatch_shared(&self, req: &Request<'_>, out: &SharedOutput<'_>) -> Outcome {
        debug_assert!(req.validate().is_ok(), "invalid request: {req:?}");
        match self.plan(req) {
            Plan::Run(kernel) => {
                let band = partition(req.m, req.n, req.ith, req.nth);
                if req.k == 0 {
                    zero_fill(out, band);
                    Outcome::Handled
                } else if kernel(req, out, band) {
                    Outcome::Handled
                } else {
                    Outcome::NotSupported
                }
            }
            Plan::Decline(outcome) => {
                tracing::trace!(
                    m = req.m,
                    n = req.n,
                    k = req.k,
                    a = %req.a.encoding(),
                    b = %req.b.encoding(),
                    %outcome,
                    "declined"
                );
                outcome
            }
        }
    }
}

fn zero_fill(out: &SharedOutput<'_>, band: Band) {
    for j in band.n0..band.n1 {
        for i in band.m0..band.m1 {
            out.write(i, j, 0.0);
        }
    }
}

/// Multiplies with the global dispatcher; true means C holds the result.
///
/// An invalid request returns false so the caller's generic path can report
/// it.
#[allow(clippy::too_many_arguments)]
pub fn sgemm(
    m: usize,
    n: usize,
    k: usize,
    a: Operand<'_>,
    lda: usize,
    b: Operand<'_>,
    ldb: usize,
    c: &mut [f32],
    ldc: usize,
    ith: usize,
    nth: usize,
    c_type: Encoding,
) -> bool {
    let req = Request::new(m, n, k, a, lda, b, ldb, ldc)
        .and_then(|req| req.for_thread(ith, nth))
        .map(|req| req.with_output_type(c_type));
    let req = match req {
        Ok(req) => req,
        Err(err) => {
            tracing::warn!(%err, "rejected sgemm request");
            return false;
        }
    };
    match Dispatcher::global().dispatch(&req, c) {
        Ok(outcome) => outcome.is_handled(),
        Err(err) => {
            tracing::warn!(%err, "rejected sgemm request");
            false
        }
    }
}

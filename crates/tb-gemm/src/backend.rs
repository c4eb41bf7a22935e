use std::fmt::Debug;

use rayon::prelude::*;
use tb_quant::{convert_rows, dequantize_units, Encoding};

use crate::dispatch::{Dispatcher, Outcome, Plan};
use crate::error::Result;
use crate::request::{check_len, Request, SharedOutput};

/// A complete matrix multiply: every request is computed, one way or another.
///
/// Unlike the dispatcher, a backend ignores `ith`/`nth` on the request and
/// always produces all of C as f32.
pub trait GemmBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "reference", "tinyblas").
    fn name(&self) -> &str;

    /// Computes `C[ldc*j + i] = dot(A row i, B row j)` for the whole request.
    fn mul_mat(&self, req: &Request<'_>, c: &mut [f32]) -> Result<()>;
}

/// Decodes both operands row by row and multiplies with plain loops.
///
/// Handles every encoding pair. Intended as the generic fallback and as the
/// reference the fast paths are tested against.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBackend;

impl ReferenceBackend {
    pub fn new() -> Self {
        ReferenceBackend
    }
}

impl GemmBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn mul_mat(&self, req: &Request<'_>, c: &mut [f32]) -> Result<()> {
        let req = whole(req)?;
        check_len("C", c.len(), req.output_len()?)?;
        let k_b = req.k_b()?;
        if req.k == 0 {
            for j in 0..req.n {
                c[req.ldc * j..req.ldc * j + req.m].fill(0.0);
            }
            return Ok(());
        }

        let mut rows_b = Vec::with_capacity(req.n * k_b * req.b.encoding().block_size());
        for j in 0..req.n {
            dequantize_units(&req.b, j * req.ldb, k_b, &mut rows_b)?;
        }
        let values = req.k * req.a.encoding().block_size();
        let mut row_a = Vec::with_capacity(values);
        for i in 0..req.m {
            row_a.clear();
            dequantize_units(&req.a, i * req.lda, req.k, &mut row_a)?;
            for j in 0..req.n {
                let row_b = &rows_b[j * values..(j + 1) * values];
                let sum: f64 = row_a.iter().zip(row_b).map(|(&x, &y)| x as f64 * y as f64).sum();
                c[req.ldc * j + i] = sum as f32;
            }
        }
        Ok(())
    }
}

/// Runs requests through the kernel dispatcher on the rayon pool.
///
/// Requests the dispatcher declines are retried once with B converted when
/// it asks for that, and otherwise handed to [`ReferenceBackend`].
#[derive(Debug, Clone)]
pub struct TinyBlasBackend {
    dispatcher: Dispatcher,
    threads: usize,
    fallback: ReferenceBackend,
}

impl TinyBlasBackend {
    /// Uses the process-wide dispatcher and one worker per rayon thread.
    pub fn new() -> Self {
        Self::with_dispatcher(Dispatcher::global().clone(), rayon::current_num_threads())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, threads: usize) -> Self {
        TinyBlasBackend {
            dispatcher,
            threads: threads.max(1),
            fallback: ReferenceBackend::new(),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// One dispatcher call per worker, each with its own `ith`.
    fn run_parallel(&self, req: &Request<'_>, c: &mut [f32]) -> Result<Outcome> {
        if let Plan::Decline(outcome) = self.dispatcher.plan(req) {
            return Ok(outcome);
        }
        let nth = self.threads.min(req.m.max(req.n)).max(1);
        if nth == 1 {
            return self.dispatcher.dispatch(req, c);
        }
        check_len("C", c.len(), req.output_len()?)?;

        let out = SharedOutput::new(c, req.ldc);
        let outcome = (0..nth)
            .into_par_iter()
            .map(|ith| {
                let part = Request { ith, nth, ..*req };
                // SAFETY: `out` borrows C exclusively and every worker has a
                // distinct `ith` of the same request.
                unsafe { self.dispatcher.dispatch_shared(&part, &out) }
            })
            .find_any(|outcome| !outcome.is_handled())
            .unwrap_or(Outcome::Handled);
        Ok(outcome)
    }
}

impl Default for TinyBlasBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GemmBackend for TinyBlasBackend {
    fn name(&self) -> &str {
        "tinyblas"
    }

    fn mul_mat(&self, req: &Request<'_>, c: &mut [f32]) -> Result<()> {
        let req = whole(req)?;
        check_len("C", c.len(), req.output_len()?)?;

        let outcome = match self.run_parallel(&req, c)? {
            Outcome::WantsQuantization(target) => {
                let k_b = req.k_b()?;
                let converted = convert_rows(&req.b, req.n, req.ldb, k_b, target)?;
                let ldb = k_b * req.b.encoding().block_size() / target.block_size();
                tracing::debug!(from = %req.b.encoding(), to = %target, n = req.n, "converted B");
                let retry = Request {
                    b: converted.as_operand(),
                    ldb,
                    ..req
                };
                retry.validate()?;
                self.run_parallel(&retry, c)?
            }
            outcome => outcome,
        };

        if !outcome.is_handled() {
            tracing::debug!(
                %outcome,
                a = %req.a.encoding(),
                b = %req.b.encoding(),
                "falling back to reference multiply"
            );
            self.fallback.mul_mat(&req, c)?;
        }
        Ok(())
    }
}

/// The request as a single-thread, f32-output multiply.
fn whole<'a>(req: &Request<'a>) -> Result<Request<'a>> {
    let req = req.with_output_type(Encoding::F32).for_thread(0, 1)?;
    req.validate()?;
    Ok(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::tier::Tier;
    use half::f16;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tb_quant::{quantize_row, Operand};

    fn random(rng: &mut StdRng, len: usize) -> Vec<f32> {
        (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }

    fn assert_close(got: &[f32], want: &[f32], tol: f32) {
        assert_eq!(got.len(), want.len());
        for (i, (x, y)) in got.iter().zip(want).enumerate() {
            assert!((x - y).abs() <= tol * y.abs().max(1.0), "[{i}] {x} vs {y}");
        }
    }

    #[test]
    fn test_reference_concrete() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let b = [1.0f32, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let req = Request::new(2, 2, 4, Operand::F32(&a), 4, Operand::F32(&b), 4, 2).unwrap();
        let mut c = [0.0f32; 4];
        ReferenceBackend::new().mul_mat(&req, &mut c).unwrap();
        assert_eq!(c, [1.0, 5.0, 2.0, 6.0]);
    }

    #[test]
    fn test_tinyblas_matches_reference_f32() {
        let mut rng = StdRng::seed_from_u64(1);
        let (m, n, k) = (45, 23, 70);
        let a = random(&mut rng, m * k);
        let b = random(&mut rng, n * k);
        let req = Request::new(m, n, k, Operand::F32(&a), k, Operand::F32(&b), k, m).unwrap();

        let mut want = vec![0.0f32; m * n];
        ReferenceBackend::new().mul_mat(&req, &mut want).unwrap();
        for threads in [1, 3, 8] {
            let backend = TinyBlasBackend::with_dispatcher(Dispatcher::global().clone(), threads);
            let mut got = vec![0.0f32; m * n];
            backend.mul_mat(&req, &mut got).unwrap();
            assert_close(&got, &want, 1e-4);
        }
    }

    #[test]
    fn test_wants_quantization_retry() {
        let mut rng = StdRng::seed_from_u64(2);
        let (m, n, k) = (8, 6, 64);
        let a = quantize_row(tb_quant::Encoding::Q8_0, &random(&mut rng, m * k)).unwrap();
        let b = random(&mut rng, n * k);
        let req = Request::new(m, n, k / 32, a.as_operand(), k / 32, Operand::F32(&b), k, m).unwrap();
        let backend = TinyBlasBackend::new();
        assert!(matches!(
            backend.dispatcher().plan(&req),
            Plan::Decline(Outcome::WantsQuantization(Encoding::Q8_0))
        ));

        let mut want = vec![0.0f32; m * n];
        ReferenceBackend::new().mul_mat(&req, &mut want).unwrap();
        let mut got = vec![0.0f32; m * n];
        backend.mul_mat(&req, &mut got).unwrap();
        // B is quantized to 8 bits on the way.
        assert_close(&got, &want, 5e-2);
    }

    #[test]
    fn test_half_promotion_retry() {
        let mut rng = StdRng::seed_from_u64(3);
        let (m, n, k) = (5, 4, 24);
        let a: Vec<f16> = random(&mut rng, m * k).into_iter().map(f16::from_f32).collect();
        let b = random(&mut rng, n * k);
        let req = Request::new(m, n, k, Operand::F16(&a), k, Operand::F32(&b), k, m).unwrap();

        let mut want = vec![0.0f32; m * n];
        ReferenceBackend::new().mul_mat(&req, &mut want).unwrap();
        let mut got = vec![0.0f32; m * n];
        TinyBlasBackend::new().mul_mat(&req, &mut got).unwrap();
        assert_close(&got, &want, 1e-2);
    }

    #[test]
    fn test_unsupported_pair_falls_back() {
        let a = vec![f16::from_f32(0.5); 64];
        let b = quantize_row(Encoding::Q8_0, &[2.0f32; 64]).unwrap();
        let req = Request::new(2, 2, 32, Operand::F16(&a), 32, b.as_operand(), 1, 2).unwrap();
        let mut c = [0.0f32; 4];
        TinyBlasBackend::new().mul_mat(&req, &mut c).unwrap();
        assert_close(&c, &[32.0; 4], 1e-3);
    }

    #[test]
    fn test_no_kernels_still_computes() {
        let dispatcher = Dispatcher::new(DispatchConfig {
            max_tier: Some(Tier::Portable),
            portable: false,
            ..DispatchConfig::default()
        });
        let backend = TinyBlasBackend::with_dispatcher(dispatcher, 2);
        let a = [1.0f32, 2.0, 3.0];
        let req = Request::new(1, 1, 3, Operand::F32(&a), 3, Operand::F32(&a), 3, 1).unwrap();
        let mut c = [0.0f32; 1];
        backend.mul_mat(&req, &mut c).unwrap();
        assert_eq!(c[0], 14.0);
    }

    #[test]
    fn test_short_output_is_error() {
        let a = [1.0f32; 4];
        let req = Request::new(2, 2, 2, Operand::F32(&a), 2, Operand::F32(&a), 2, 2).unwrap();
        let mut c = [0.0f32; 3];
        assert!(TinyBlasBackend::new().mul_mat(&req, &mut c).is_err());
        assert!(ReferenceBackend::new().mul_mat(&req, &mut c).is_err());
    }
}

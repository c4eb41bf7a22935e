//! Strategy table: one kernel entry per (A encoding, B encoding) pair.

use half::{bf16, f16};
use tb_quant::{
    BlockIq4Nl, BlockQ4_0, BlockQ4_1, BlockQ5_0, BlockQ8_0, BlockQ8_1, DotBlock, Encoding,
    FloatElement, QuantBlock, Unit,
};

use crate::config::DispatchConfig;
use crate::cpu_features::CpuFeatures;
use crate::engine::{self, FloatKernel, QuantKernel};
use crate::lane::portable::{Portable, PortableDot};
use crate::lane::{DotLane, Load};
use crate::partition::Band;
use crate::request::{Request, SharedOutput};
use crate::tier::Tier;

/// Computes `band` of the request into `out`.
///
/// Returns false if the operands do not have the encodings the entry was
/// registered for.
pub type KernelFn = fn(&Request<'_>, &SharedOutput<'_>, Band) -> bool;

type Entries = [[Option<KernelFn>; Encoding::COUNT]; Encoding::COUNT];

/// Kernels resolved for one host and configuration.
#[derive(Clone)]
pub struct KernelTable {
    entries: Entries,
    float_tier: Option<Tier>,
    dot_tier: Option<Tier>,
}

impl std::fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable")
            .field("float_tier", &self.float_tier)
            .field("dot_tier", &self.dot_tier)
            .field("pairs", &self.pairs().count())
            .finish()
    }
}

impl KernelTable {
    /// Selects the best tier for each engine family and fills in its kernels.
    pub fn build(features: &CpuFeatures, config: &DispatchConfig) -> KernelTable {
        let float_tier = Tier::select_float(features, config);
        let dot_tier = Tier::select_dot(features, config);

        let mut entries: Entries = [[None; Encoding::COUNT]; Encoding::COUNT];
        let float = float_tier.map(float_kernels).into_iter().flatten();
        let dot = dot_tier.map(dot_kernels).into_iter().flatten();
        for (a, b, kernel) in float.chain(dot) {
            entries[a.index()][b.index()] = Some(kernel);
        }

        let table = KernelTable {
            entries,
            float_tier,
            dot_tier,
        };
        tracing::debug!(
            float_tier = ?float_tier,
            dot_tier = ?dot_tier,
            pairs = table.pairs().count(),
            "built kernel table"
        );
        table
    }

    /// The kernel for an encoding pair, if any engine handles it here.
    pub fn get(&self, a: Encoding, b: Encoding) -> Option<KernelFn> {
        self.entries[a.index()][b.index()]
    }

    pub fn contains(&self, a: Encoding, b: Encoding) -> bool {
        self.get(a, b).is_some()
    }

    /// Tier of the floating-point kernels, `None` if they are disabled.
    pub fn float_tier(&self) -> Option<Tier> {
        self.float_tier
    }

    /// Tier of the block-quantized kernels, `None` if they are disabled.
    pub fn dot_tier(&self) -> Option<Tier> {
        self.dot_tier
    }

    /// All encoding pairs with a kernel.
    pub fn pairs(&self) -> impl Iterator<Item = (Encoding, Encoding)> + '_ {
        Encoding::ALL.into_iter().flat_map(move |a| {
            Encoding::ALL
                .into_iter()
                .filter(move |&b| self.contains(a, b))
                .map(move |b| (a, b))
        })
    }
}

type Entry = (Encoding, Encoding, KernelFn);

macro_rules! float_entries {
    ($kernel:ident) => {
        [
            (Encoding::F32, Encoding::F32, $kernel::<f32, f32> as KernelFn),
            (Encoding::F16, Encoding::F16, $kernel::<f16, f16> as KernelFn),
            (Encoding::F16, Encoding::F32, $kernel::<f16, f32> as KernelFn),
            (Encoding::BF16, Encoding::BF16, $kernel::<bf16, bf16> as KernelFn),
            (Encoding::BF16, Encoding::F32, $kernel::<bf16, f32> as KernelFn),
        ]
    };
}

macro_rules! dot_entries {
    ($kernel:ident) => {
        [
            (Encoding::Q8_0, Encoding::Q8_0, $kernel::<BlockQ8_0, BlockQ8_0> as KernelFn),
            (Encoding::Q4_0, Encoding::Q8_0, $kernel::<BlockQ4_0, BlockQ8_0> as KernelFn),
            (Encoding::Q5_0, Encoding::Q8_0, $kernel::<BlockQ5_0, BlockQ8_0> as KernelFn),
            (Encoding::IQ4_NL, Encoding::Q8_0, $kernel::<BlockIq4Nl, BlockQ8_0> as KernelFn),
            (Encoding::Q4_1, Encoding::Q8_1, $kernel::<BlockQ4_1, BlockQ8_1> as KernelFn),
        ]
    };
}

fn float_kernels(tier: Tier) -> [Entry; 5] {
    match tier {
        #[cfg(target_arch = "x86_64")]
        Tier::Avx512 => float_entries!(avx512_float),
        #[cfg(target_arch = "x86_64")]
        Tier::Avx2 => float_entries!(avx2_float),
        #[cfg(target_arch = "aarch64")]
        Tier::Neon => float_entries!(neon_float),
        _ => float_entries!(portable_float),
    }
}

fn dot_kernels(tier: Tier) -> [Entry; 5] {
    match tier {
        #[cfg(target_arch = "x86_64")]
        Tier::Avx2 | Tier::Avx512 => dot_entries!(avx2_dot),
        #[cfg(target_arch = "aarch64")]
        Tier::Neon => dot_entries!(neon_dot),
        _ => dot_entries!(portable_dot),
    }
}

#[inline(always)]
fn float_kernel<V, TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
where
    V: Load<TA> + Load<TB>,
    TA: Unit + FloatElement,
    TB: Unit + FloatElement,
{
    let (Some(a), Some(b)) = (TA::view(&req.a), TB::view(&req.b)) else {
        return false;
    };
    let kernel = FloatKernel::<V, TA, TB>::new(a, req.lda, b, req.ldb, req.k);
    engine::run(&kernel, out, band);
    true
}

#[inline(always)]
fn dot_kernel<V, TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
where
    V: DotLane,
    TA: Unit + QuantBlock,
    TB: Unit + DotBlock,
{
    let (Some(a), Some(b)) = (TA::view(&req.a), TB::view(&req.b)) else {
        return false;
    };
    let kernel = QuantKernel::<V, TA, TB>::new(a, req.lda, b, req.ldb, req.k);
    engine::run(&kernel, out, band);
    true
}

fn portable_float<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
where
    TA: Unit + FloatElement,
    TB: Unit + FloatElement,
{
    float_kernel::<Portable<8>, TA, TB>(req, out, band)
}

fn portable_dot<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
where
    TA: Unit + QuantBlock,
    TB: Unit + DotBlock,
{
    dot_kernel::<PortableDot, TA, TB>(req, out, band)
}

#[cfg(target_arch = "x86_64")]
use x86::{avx2_dot, avx2_float, avx512_float};

#[cfg(target_arch = "x86_64")]
mod x86 {
    use super::*;
    use crate::lane::avx2::{Avx2, Avx2Dot};

    #[target_feature(enable = "avx2,fma,f16c")]
    unsafe fn avx2_float_impl<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        Avx2: Load<TA> + Load<TB>,
        TA: Unit + FloatElement,
        TB: Unit + FloatElement,
    {
        float_kernel::<Avx2, TA, TB>(req, out, band)
    }

    pub(super) fn avx2_float<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        Avx2: Load<TA> + Load<TB>,
        TA: Unit + FloatElement,
        TB: Unit + FloatElement,
    {
        // SAFETY: registered only when the host reports AVX2, FMA and F16C.
        unsafe { avx2_float_impl::<TA, TB>(req, out, band) }
    }

    #[target_feature(enable = "avx512f,avx2,fma,f16c")]
    unsafe fn avx512_float_impl<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        TA: Unit + FloatElement,
        TB: Unit + FloatElement,
    {
        float_kernel::<Portable<16>, TA, TB>(req, out, band)
    }

    pub(super) fn avx512_float<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        TA: Unit + FloatElement,
        TB: Unit + FloatElement,
    {
        // SAFETY: registered only when the host reports AVX-512F and the AVX2 set.
        unsafe { avx512_float_impl::<TA, TB>(req, out, band) }
    }

    #[target_feature(enable = "avx2,fma")]
    unsafe fn avx2_dot_impl<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        TA: Unit + QuantBlock,
        TB: Unit + DotBlock,
    {
        dot_kernel::<Avx2Dot, TA, TB>(req, out, band)
    }

    pub(super) fn avx2_dot<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        TA: Unit + QuantBlock,
        TB: Unit + DotBlock,
    {
        // SAFETY: registered only when the host reports AVX2 and FMA.
        unsafe { avx2_dot_impl::<TA, TB>(req, out, band) }
    }
}

#[cfg(target_arch = "aarch64")]
use arm::{neon_dot, neon_float};

#[cfg(target_arch = "aarch64")]
mod arm {
    use super::*;
    use crate::lane::neon::{Neon, NeonDot};

    pub(super) fn neon_float<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        Neon: Load<TA> + Load<TB>,
        TA: Unit + FloatElement,
        TB: Unit + FloatElement,
    {
        float_kernel::<Neon, TA, TB>(req, out, band)
    }

    pub(super) fn neon_dot<TA, TB>(req: &Request<'_>, out: &SharedOutput<'_>, band: Band) -> bool
    where
        TA: Unit + QuantBlock,
        TB: Unit + DotBlock,
    {
        dot_kernel::<NeonDot, TA, TB>(req, out, band)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portable_only() -> DispatchConfig {
        DispatchConfig {
            max_tier: Some(Tier::Portable),
            ..DispatchConfig::default()
        }
    }

    #[test]
    fn test_supported_pairs() {
        let table = KernelTable::build(CpuFeatures::get(), &portable_only());
        let pairs: Vec<_> = table.pairs().collect();
        assert_eq!(pairs.len(), 10);
        assert!(table.contains(Encoding::F32, Encoding::F32));
        assert!(table.contains(Encoding::BF16, Encoding::F32));
        assert!(table.contains(Encoding::Q4_1, Encoding::Q8_1));
        assert!(!table.contains(Encoding::F32, Encoding::F16));
        assert!(!table.contains(Encoding::F16, Encoding::Q8_0));
        assert!(!table.contains(Encoding::Q4_0, Encoding::Q8_1));
    }

    #[test]
    fn test_portable_disabled_leaves_table_empty() {
        let config = DispatchConfig {
            max_tier: Some(Tier::Portable),
            portable: false,
            ..DispatchConfig::default()
        };
        let table = KernelTable::build(CpuFeatures::get(), &config);
        assert_eq!(table.pairs().count(), 0);
        assert_eq!(table.float_tier(), None);
        assert_eq!(table.dot_tier(), None);
    }

    #[test]
    fn test_entry_rejects_wrong_operands() {
        let table = KernelTable::build(CpuFeatures::get(), &portable_only());
        let kernel = table.get(Encoding::F16, Encoding::F16).unwrap();
        let a = [1.0f32; 4];
        let req = Request::new(1, 1, 4, tb_quant::Operand::F32(&a), 4, tb_quant::Operand::F32(&a), 4, 1).unwrap();
        let mut c = [0.0f32; 1];
        let out = SharedOutput::new(&mut c, 1);
        assert!(!kernel(&req, &out, Band { m0: 0, m1: 1, n0: 0, n1: 1 }));
    }

    #[test]
    fn test_no_tier_above_cap() {
        let config = DispatchConfig {
            max_tier: Some(Tier::Avx2),
            ..DispatchConfig::default()
        };
        let table = KernelTable::build(CpuFeatures::get(), &config);
        assert_ne!(table.float_tier(), Some(Tier::Avx512));
    }
}

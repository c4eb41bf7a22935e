//! One-time detection of the host's vector extensions.

use std::fmt;
use std::sync::OnceLock;

/// Vector-extension flags of the host processor.
///
/// Detected once per process by [`CpuFeatures::get`]; immutable afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub avx: bool,
    pub avx2: bool,
    pub fma: bool,
    pub f16c: bool,
    pub avx512f: bool,
    pub neon: bool,
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

impl CpuFeatures {
    /// Returns the cached flags, detecting them on first use.
    pub fn get() -> &'static CpuFeatures {
        FEATURES.get_or_init(|| {
            let features = Self::detect();
            tracing::debug!(%features, "detected cpu features");
            features
        })
    }

    /// Queries the processor. Prefer [`CpuFeatures::get`].
    #[cfg(target_arch = "x86_64")]
    pub fn detect() -> CpuFeatures {
        CpuFeatures {
            avx: is_x86_feature_detected!("avx"),
            avx2: is_x86_feature_detected!("avx2"),
            fma: is_x86_feature_detected!("fma"),
            f16c: is_x86_feature_detected!("f16c"),
            avx512f: is_x86_feature_detected!("avx512f"),
            ..CpuFeatures::default()
        }
    }

    #[cfg(target_arch = "aarch64")]
    pub fn detect() -> CpuFeatures {
        CpuFeatures {
            neon: std::arch::is_aarch64_feature_detected!("neon"),
            ..CpuFeatures::default()
        }
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub fn detect() -> CpuFeatures {
        CpuFeatures::default()
    }

    /// AVX2 with FMA and F16C: what the 256-bit float engine needs.
    pub fn has_avx2_fma(&self) -> bool {
        self.avx && self.avx2 && self.fma && self.f16c
    }
}

impl fmt::Display for CpuFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            ("avx", self.avx),
            ("avx2", self.avx2),
            ("fma", self.fma),
            ("f16c", self.f16c),
            ("avx512f", self.avx512f),
            ("neon", self.neon),
        ];
        let mut first = true;
        for (name, _) in flags.iter().filter(|(_, on)| *on) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

use std::fmt;
use std::str::FromStr;

use crate::config::DispatchConfig;
use crate::cpu_features::CpuFeatures;
use crate::error::GemmError;

/// Capability tier an engine is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Array lanes with no target features; runs anywhere.
    Portable,
    /// 128-bit Advanced SIMD.
    Neon,
    /// 256-bit AVX2 with FMA and F16C.
    Avx2,
    /// 512-bit AVX-512F.
    Avx512,
}

impl Tier {
    /// Register width class, used to cap tiers from configuration.
    fn rank(self) -> u8 {
        match self {
            Tier::Portable => 0,
            Tier::Neon => 1,
            Tier::Avx2 => 2,
            Tier::Avx512 => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Portable => "portable",
            Tier::Neon => "neon",
            Tier::Avx2 => "avx2",
            Tier::Avx512 => "avx512",
        }
    }

    /// Best tier for the floating-point engines, widest first.
    pub fn select_float(features: &CpuFeatures, config: &DispatchConfig) -> Option<Tier> {
        let candidates = [
            (Tier::Avx512, features.avx512f && features.has_avx2_fma()),
            (Tier::Avx2, features.has_avx2_fma()),
            (Tier::Neon, features.neon),
            (Tier::Portable, true),
        ];
        Self::pick(&candidates, config)
    }

    /// Best tier for the integer dot-product engines.
    ///
    /// There is no 512-bit integer kernel; AVX-512 hosts run the AVX2 one.
    pub fn select_dot(features: &CpuFeatures, config: &DispatchConfig) -> Option<Tier> {
        let candidates = [
            (Tier::Avx2, features.avx2 && features.fma),
            (Tier::Neon, features.neon),
            (Tier::Portable, true),
        ];
        Self::pick(&candidates, config)
    }

    fn pick(candidates: &[(Tier, bool)], config: &DispatchConfig) -> Option<Tier> {
        candidates
            .iter()
            .filter(|(_, supported)| *supported)
            .map(|&(tier, _)| tier)
            .filter(|t| config.max_tier.map_or(true, |max| t.rank() <= max.rank()))
            .find(|&t| t != Tier::Portable || config.portable)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = GemmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portable" | "scalar" => Ok(Tier::Portable),
            "neon" => Ok(Tier::Neon),
            "avx2" => Ok(Tier::Avx2),
            "avx512" | "avx512f" => Ok(Tier::Avx512),
            _ => Err(GemmError::Config {
                key: "tier",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x86_avx512() -> CpuFeatures {
        CpuFeatures {
            avx: true,
            avx2: true,
            fma: true,
            f16c: true,
            avx512f: true,
            ..CpuFeatures::default()
        }
    }

    #[test]
    fn test_widest_first() {
        let cfg = DispatchConfig::default();
        assert_eq!(Tier::select_float(&x86_avx512(), &cfg), Some(Tier::Avx512));
        assert_eq!(Tier::select_dot(&x86_avx512(), &cfg), Some(Tier::Avx2));
    }

    #[test]
    fn test_max_tier_caps_selection() {
        let cfg = DispatchConfig {
            max_tier: Some(Tier::Avx2),
            ..DispatchConfig::default()
        };
        assert_eq!(Tier::select_float(&x86_avx512(), &cfg), Some(Tier::Avx2));

        let cfg = DispatchConfig {
            max_tier: Some(Tier::Portable),
            ..DispatchConfig::default()
        };
        assert_eq!(Tier::select_float(&x86_avx512(), &cfg), Some(Tier::Portable));
    }

    #[test]
    fn test_no_vector_support_without_portable() {
        let cfg = DispatchConfig {
            portable: false,
            ..DispatchConfig::default()
        };
        assert_eq!(Tier::select_float(&CpuFeatures::default(), &cfg), None);
        assert_eq!(Tier::select_dot(&CpuFeatures::default(), &cfg), None);

        let neon = CpuFeatures {
            neon: true,
            ..CpuFeatures::default()
        };
        assert_eq!(Tier::select_float(&neon, &cfg), Some(Tier::Neon));
    }

    #[test]
    fn test_avx2_without_f16c_falls_back() {
        let f = CpuFeatures {
            avx2: true,
            fma: true,
            ..CpuFeatures::default()
        };
        let cfg = DispatchConfig::default();
        assert_eq!(Tier::select_float(&f, &cfg), Some(Tier::Portable));
        assert_eq!(Tier::select_dot(&f, &cfg), Some(Tier::Avx2));
    }

    #[test]
    fn test_parse() {
        assert_eq!("AVX2".parse::<Tier>().unwrap(), Tier::Avx2);
        assert_eq!(" neon ".parse::<Tier>().unwrap(), Tier::Neon);
        assert!("sse9".parse::<Tier>().is_err());
        assert_eq!("avx512f".parse::<Tier>().unwrap(), Tier::Avx512);
    }
}

use tb_gemm::{Outcome, Tier};

/// Status codes returned by all FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TbStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorInternal = 2,
}

/// What a dispatch attempt did.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TbOutcomeKind {
    Handled = 0,
    NotSupported = 1,
    NotProfitable = 2,
    WantsQuantization = 3,
}

/// Detailed dispatch result.
///
/// `wants_type` is the GGML type id B should be converted to when `kind` is
/// `WantsQuantization`, and -1 otherwise.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TbOutcome {
    pub kind: TbOutcomeKind,
    pub wants_type: i32,
}

impl Default for TbOutcome {
    fn default() -> Self {
        Self {
            kind: TbOutcomeKind::NotSupported,
            wants_type: -1,
        }
    }
}

impl From<Outcome> for TbOutcome {
    fn from(outcome: Outcome) -> Self {
        let kind = match outcome {
            Outcome::Handled => TbOutcomeKind::Handled,
            Outcome::NotSupported => TbOutcomeKind::NotSupported,
            Outcome::NotProfitable => TbOutcomeKind::NotProfitable,
            Outcome::WantsQuantization(_) => TbOutcomeKind::WantsQuantization,
        };
        let wants_type = match outcome {
            Outcome::WantsQuantization(enc) => enc.to_gguf_type() as i32,
            _ => -1,
        };
        TbOutcome { kind, wants_type }
    }
}

/// Vector tier of the floating-point kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TbTier {
    Unavailable = 0,
    Portable = 1,
    Neon = 2,
    Avx2 = 3,
    Avx512 = 4,
}

impl From<Option<Tier>> for TbTier {
    fn from(tier: Option<Tier>) -> Self {
        match tier {
            None => TbTier::Unavailable,
            Some(Tier::Portable) => TbTier::Portable,
            Some(Tier::Neon) => TbTier::Neon,
            Some(Tier::Avx2) => TbTier::Avx2,
            Some(Tier::Avx512) => TbTier::Avx512,
        }
    }
}

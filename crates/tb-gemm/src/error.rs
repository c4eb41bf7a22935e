use thiserror::Error;

#[derive(Error, Debug)]
pub enum GemmError {
    #[error("{name}={stride} is smaller than the reduction length k={k}")]
    InvalidStride {
        name: &'static str,
        stride: usize,
        k: usize,
    },
    #[error("ldc={ldc} is smaller than m={m}")]
    InvalidOutputStride { ldc: usize, m: usize },
    #[error("invalid thread assignment: ith={ith}, nth={nth}")]
    InvalidThread { ith: usize, nth: usize },
    #[error("{operand} buffer holds {len} units but the geometry needs {required}")]
    BufferTooSmall {
        operand: &'static str,
        len: usize,
        required: usize,
    },
    #[error("k={k} {a} blocks do not span whole {b} units")]
    ReductionMismatch {
        k: usize,
        a: tb_quant::Encoding,
        b: tb_quant::Encoding,
    },
    #[error("{what} overflows the address space")]
    GeometryOverflow { what: &'static str },
    #[error("invalid value {value:?} for {key}")]
    Config { key: &'static str, value: String },
    #[error("quantization error: {0}")]
    Quant(#[from] tb_quant::QuantError),
}

pub type Result<T> = std::result::Result<T, GemmError>;

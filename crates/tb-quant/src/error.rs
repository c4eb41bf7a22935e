use bytemuck::PodCastError;
use thiserror::Error;

use crate::encoding::Encoding;

#[derive(Error, Debug)]
pub enum QuantError {
    #[error("row length {len} is not a multiple of the {encoding} block size {block}")]
    RowLength {
        encoding: Encoding,
        len: usize,
        block: usize,
    },
    #[error("cannot view {len} bytes as {encoding} data: {reason:?}")]
    Cast {
        encoding: Encoding,
        len: usize,
        reason: PodCastError,
    },
    #[error("operand too short: {what} needs {required} units, got {len}")]
    BufferTooSmall {
        what: &'static str,
        len: usize,
        required: usize,
    },
}

pub type Result<T> = std::result::Result<T, QuantError>;

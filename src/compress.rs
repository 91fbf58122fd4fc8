//! Optional zstd post-compression of finished messages.
//!
//! A packed message starts with a single marker byte. `0` means the message follows as-is, `1`
//! means a standard zstd frame follows, with its decompressed size recorded in the frame header.
//! Messages are only ever stored compressed if that actually makes them smaller.

use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, fmt};

use crate::error::Result;
use crate::MAX_MESSAGE_SIZE;

thread_local! {
    static ZSTD_CCTX: RefCell<zstd_safe::CCtx<'static>> = RefCell::new(zstd_safe::CCtx::create());
    static ZSTD_DCTX: RefCell<zstd_safe::DCtx<'static>> = RefCell::new(zstd_safe::DCtx::create());
}

const MARKER_NONE: u8 = 0;
const MARKER_ZSTD: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    ExceededSize { max: usize, actual: usize },
    ZstdInner(usize),
    Parsing(&'static str),
}

impl fmt::Display for CompressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionError::ExceededSize { max, actual } => write!(
                f,
                "Message size is {} bytes, larger than max of {} kiB",
                actual,
                (max + 1) >> 10
            ),
            CompressionError::ZstdInner(v) => {
                write!(f, "zstd failure, code {} ({})", v, zstd_safe::get_error_name(*v))
            }
            CompressionError::Parsing(s) => f.write_str(s),
        }
    }
}

impl std::error::Error for CompressionError {}

impl From<zstd_safe::ErrorCode> for CompressionError {
    fn from(value: zstd_safe::ErrorCode) -> Self {
        CompressionError::ZstdInner(value)
    }
}

/// Post-compression settings for encoded messages.
#[derive(Clone, Debug, PartialEq, Eq, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub enum Compress {
    /// Store the message as-is, behind the marker byte.
    #[educe(Default)]
    None,
    /// Compress with zstd at the given level.
    Zstd { level: i32 },
}

impl Compress {
    pub fn zstd(level: i32) -> Self {
        Compress::Zstd { level }
    }

    /// Pack an encoded message, compressing it if that makes it smaller.
    pub fn compress(&self, message: &[u8]) -> Result<Vec<u8>> {
        if message.len() > MAX_MESSAGE_SIZE {
            return Err(CompressionError::ExceededSize {
                max: MAX_MESSAGE_SIZE,
                actual: message.len(),
            }
            .into());
        }
        if let Compress::Zstd { level } = self {
            let mut out = vec![MARKER_ZSTD];
            zstd_compress(message, &mut out, *level)?;
            if out.len() <= message.len() {
                log::debug!(
                    "Compressed message from {} to {} bytes",
                    message.len(),
                    out.len()
                );
                return Ok(out);
            }
        }
        let mut out = Vec::with_capacity(message.len() + 1);
        out.push(MARKER_NONE);
        out.extend_from_slice(message);
        Ok(out)
    }
}

/// Unpack a message produced by [`Compress::compress`], whatever settings were used for it.
pub fn decompress(packed: &[u8]) -> Result<Vec<u8>> {
    let Some((marker, body)) = packed.split_first() else {
        return Err(CompressionError::Parsing("missing compression marker").into());
    };
    match *marker {
        MARKER_NONE => {
            if body.len() > MAX_MESSAGE_SIZE {
                return Err(CompressionError::ExceededSize {
                    max: MAX_MESSAGE_SIZE,
                    actual: body.len(),
                }
                .into());
            }
            Ok(body.to_vec())
        }
        MARKER_ZSTD => Ok(zstd_decompress(body, MAX_MESSAGE_SIZE)?),
        _ => Err(CompressionError::Parsing("unrecognized compression marker").into()),
    }
}

/// Append a single zstd frame, with content size, to `output`.
fn zstd_compress(input: &[u8], output: &mut Vec<u8>, level: i32) -> Result<usize, CompressionError> {
    use zstd_safe::*;
    let start = output.len();
    output.resize(start + compress_bound(input.len()), 0);
    let used_len = ZSTD_CCTX.with_borrow_mut(|ctx| -> Result<usize, CompressionError> {
        ctx.reset(ResetDirective::SessionAndParameters)?;
        ctx.set_parameter(CParameter::CompressionLevel(level))?;
        ctx.set_parameter(CParameter::ChecksumFlag(true))?;
        ctx.set_parameter(CParameter::ContentSizeFlag(true))?;
        ctx.set_pledged_src_size(Some(input.len() as u64))?;
        Ok(ctx.compress2(&mut output[start..], input)?)
    })?;
    output.truncate(start + used_len);
    Ok(used_len)
}

fn zstd_decompress(input: &[u8], max_size: usize) -> Result<Vec<u8>, CompressionError> {
    use zstd_safe::*;
    let out_size = match get_frame_content_size(input) {
        Ok(Some(size)) => size,
        Ok(None) => return Err(CompressionError::Parsing("Missing frame content size")),
        Err(_) => return Err(CompressionError::Parsing("Not a zstd frame")),
    };
    if out_size > max_size as u64 {
        return Err(CompressionError::ExceededSize {
            max: max_size,
            actual: usize::try_from(out_size).unwrap_or(usize::MAX),
        });
    }
    let out_size = out_size as usize;
    let mut output = vec![0u8; out_size];

    let used_len = ZSTD_DCTX.with_borrow_mut(|dtx| -> Result<usize, CompressionError> {
        dtx.reset(ResetDirective::SessionAndParameters)?;
        Ok(dtx.decompress(&mut output[..], input)?)
    })?;
    if used_len != out_size {
        return Err(CompressionError::Parsing(
            "Decompressed size doesn't match promised size",
        ));
    }
    Ok(output)
}

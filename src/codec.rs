//! Raw capture pixels to a bitmap file the renderer can decode.
//!
//! The stream is a BITMAPFILEHEADER + BITMAPINFOHEADER pair followed by the
//! pixel rows exactly as captured. The height is written negated so rows are
//! read top-down, which is the order capture providers hand them out in.

pub const HEADER_LEN: usize = 54;
const INFO_HEADER_LEN: u32 = 40;
const BYTES_PER_PIXEL: usize = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

/// Wrap a 32-bit pixel buffer (BGRA rows, top to bottom) in a bitmap header.
pub fn encode(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
    if width == 0 || height == 0 || height > i32::MAX as u32 || width > i32::MAX as u32 {
        return Err(CodecError::InvalidDimensions { width, height });
    }
    let image_size = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .filter(|n| HEADER_LEN + n <= u32::MAX as usize)
        .ok_or(CodecError::InvalidDimensions { width, height })?;
    if pixels.len() != image_size {
        return Err(CodecError::BufferSizeMismatch {
            expected: image_size,
            actual: pixels.len(),
        });
    }

    let mut out = Vec::with_capacity(HEADER_LEN + image_size);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&((HEADER_LEN + image_size) as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(HEADER_LEN as u32).to_le_bytes());
    out.extend_from_slice(&INFO_HEADER_LEN.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(-(height as i32)).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&32u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    // resolution x/y, colors used, important colors
    out.extend_from_slice(&[0u8; 16]);
    debug_assert_eq!(out.len(), HEADER_LEN);

    out.extend_from_slice(pixels);
    Ok(out)
}

use serde::{Deserialize, Serialize};

/// An RGBA8 image, row-major, four bytes per pixel.
///
/// Buffers move between the worker and the orchestrator by value; the sender
/// keeps no reference after the move.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPixels")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

/// Raw data does not match the declared dimensions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pixel data has {actual} bytes, expected {expected} for {width}x{height}")]
pub struct SizeMismatch {
    pub width: u32,
    pub height: u32,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Deserialize)]
struct RawPixels {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TryFrom<RawPixels> for PixelBuffer {
    type Error = SizeMismatch;

    fn try_from(raw: RawPixels) -> Result<Self, SizeMismatch> {
        Self::from_rgba(raw.width, raw.height, raw.data)
    }
}

impl PixelBuffer {
    /// A fully transparent black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    /// Wrap existing RGBA bytes.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, SizeMismatch> {
        let expected = Self::byte_len(width, height);
        if data.len() != expected {
            return Err(SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 4
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// RGBA of the pixel at (x, y), or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&rgba);
    }
}

// Pixel data is too large to be useful in debug output.
impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buf = PixelBuffer::new(3, 2);
        assert_eq!(buf.as_bytes().len(), 24);
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_rgba_checks_length() {
        assert!(PixelBuffer::from_rgba(2, 2, vec![0; 16]).is_ok());
        let err = PixelBuffer::from_rgba(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(err.expected, 16);
        assert_eq!(err.actual, 15);
    }

    #[test]
    fn set_and_get_pixel() {
        let mut buf = PixelBuffer::new(4, 4);
        buf.set_pixel(2, 3, [1, 2, 3, 255]);
        assert_eq!(buf.pixel(2, 3), Some([1, 2, 3, 255]));
        assert_eq!(buf.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(buf.pixel(4, 0), None);
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        let ok = r#"{"width":1,"height":1,"data":[1,2,3,4]}"#;
        assert!(serde_json::from_str::<PixelBuffer>(ok).is_ok());
        let bad = r#"{"width":2,"height":1,"data":[1,2,3,4]}"#;
        assert!(serde_json::from_str::<PixelBuffer>(bad).is_err());
    }

    #[test]
    fn debug_omits_pixel_data() {
        let buf = PixelBuffer::new(100, 100);
        let out = format!("{buf:?}");
        assert!(out.contains("bytes: 40000"));
    }
}

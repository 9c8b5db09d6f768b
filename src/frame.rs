//! Frame buffer shared between acquisition, classification and capture.

/// A decoded camera frame: RGB24 pixel data, row-major.
///
/// Frames are immutable once produced and are shared between consumers as
/// `Arc<Frame>`. Anything that needs to draw on a frame works on a copy.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    /// RGB pixel data, 3 bytes per pixel
    data: Vec<u8>,
}

/// Side length of the status marker drawn on annotated snapshot copies.
const MARKER_SIZE: u32 = 24;
/// Inset of the marker from the top-left corner.
const MARKER_INSET: u32 = 8;

impl Frame {
    /// Create a frame from raw RGB24 data.
    ///
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the frame, returning the raw RGB buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Convert to a single-channel grayscale buffer (ITU-R BT.601 luma).
    pub fn to_luma(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|px| {
                let r = px[0] as u32;
                let g = px[1] as u32;
                let b = px[2] as u32;
                // Integer approximation of 0.299 R + 0.587 G + 0.114 B
                ((r * 77 + g * 150 + b * 29) >> 8) as u8
            })
            .collect()
    }

    /// Return an annotated copy carrying the classification status as a
    /// solid corner marker: green when a subject is present, gray otherwise.
    /// The original frame is left untouched.
    pub fn annotated(&self, subject_present: bool) -> Frame {
        let mut copy = self.clone();
        let color: [u8; 3] = if subject_present {
            [48, 214, 48]
        } else {
            [110, 110, 110]
        };
        let x_end = (MARKER_INSET + MARKER_SIZE).min(copy.width);
        let y_end = (MARKER_INSET + MARKER_SIZE).min(copy.height);
        for y in MARKER_INSET.min(copy.height)..y_end {
            for x in MARKER_INSET.min(copy.width)..x_end {
                let idx = ((y * copy.width + x) * 3) as usize;
                copy.data[idx..idx + 3].copy_from_slice(&color);
            }
        }
        copy
    }
}

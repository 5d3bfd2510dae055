//! Defines layout and buffer of our images.
use core::convert::TryFrom;
use core::fmt;

/// The element type of a single channel sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    /// One byte per channel, 0–255.
    U8,
    /// One IEEE-754 single per channel, nominally 0.0–1.0.
    ///
    /// Intermediate values are not clamped anywhere inside the engine;
    /// kernels treat them as linear samples. Clamping happens exactly once,
    /// at quantization back to `U8`.
    F32,
}

/// Channel order and channel count of a pixel.
///
/// The order is part of the layout, not metadata. `Hsv` stores hue scaled
/// into the element range: for `U8` the hue byte is `round(degrees / 2)`
/// (0..=180), for `F32` hue is a fraction of a full turn in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColorLayout {
    Rgb,
    Rgba,
    Bgr,
    Bgra,
    Gray,
    Hsv,
}

/// An (element, layout) pair, the wire format of a pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    pub element: ElementType,
    pub layout: ColorLayout,
}

/// The byte layout of a buffer.
///
/// An inner invariant is that the layout fits in memory, and in particular
/// into a `usize`, while at the same time also fitting inside a `u64` of
/// bytes. Rows are tightly packed, row-major, origin at the top-left with y
/// increasing downward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferLayout {
    /// The number of pixels along our width.
    pub(crate) width: u32,
    /// The number of pixels along our height.
    pub(crate) height: u32,
    /// How channels are encoded into each pixel.
    pub(crate) format: PixelFormat,
}

/// An owned, dense pixel buffer.
///
/// Samples are stored in their element representation so that `F32` data
/// keeps its natural alignment. Byte views are derived, not stored.
#[derive(Clone, PartialEq)]
pub struct ImageBuffer {
    layout: BufferLayout,
    samples: Samples,
}

#[derive(Clone, PartialEq)]
enum Samples {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

impl ElementType {
    /// Size of one channel sample in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::F32 => 4,
        }
    }
}

impl ColorLayout {
    /// The number of channels of this layout.
    pub fn channels(self) -> u8 {
        match self {
            ColorLayout::Gray => 1,
            ColorLayout::Rgb | ColorLayout::Bgr | ColorLayout::Hsv => 3,
            ColorLayout::Rgba | ColorLayout::Bgra => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, ColorLayout::Rgba | ColorLayout::Bgra)
    }

    /// Stable lowercase identifier, used by serialization and the DSL.
    pub fn name(self) -> &'static str {
        match self {
            ColorLayout::Rgb => "rgb",
            ColorLayout::Rgba => "rgba",
            ColorLayout::Bgr => "bgr",
            ColorLayout::Bgra => "bgra",
            ColorLayout::Gray => "gray",
            ColorLayout::Hsv => "hsv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "rgb" => ColorLayout::Rgb,
            "rgba" => ColorLayout::Rgba,
            "bgr" => ColorLayout::Bgr,
            "bgra" => ColorLayout::Bgra,
            "gray" | "grey" => ColorLayout::Gray,
            "hsv" => ColorLayout::Hsv,
            _ => return None,
        })
    }
}

impl PixelFormat {
    pub const RGB_U8: Self = PixelFormat::new(ElementType::U8, ColorLayout::Rgb);
    pub const RGBA_U8: Self = PixelFormat::new(ElementType::U8, ColorLayout::Rgba);
    pub const GRAY_U8: Self = PixelFormat::new(ElementType::U8, ColorLayout::Gray);
    pub const RGB_F32: Self = PixelFormat::new(ElementType::F32, ColorLayout::Rgb);
    pub const RGBA_F32: Self = PixelFormat::new(ElementType::F32, ColorLayout::Rgba);
    pub const GRAY_F32: Self = PixelFormat::new(ElementType::F32, ColorLayout::Gray);

    pub const fn new(element: ElementType, layout: ColorLayout) -> Self {
        PixelFormat { element, layout }
    }

    pub fn channels(self) -> usize {
        usize::from(self.layout.channels())
    }

    /// Size of one whole pixel in bytes.
    pub fn pixel_size(self) -> usize {
        self.channels() * self.element.size()
    }
}

impl BufferLayout {
    /// Create a layout, verifying the inner memory invariant.
    ///
    /// Returns `None` when `width * height * channels` overflows either the
    /// `u64` byte size or the addressable `usize`.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Option<Self> {
        let pixel_stride = u64::try_from(format.pixel_size()).ok()?;
        let row_stride = u64::from(width).checked_mul(pixel_stride)?;
        let u64_len = u64::from(height).checked_mul(row_stride)?;
        let _ = usize::try_from(u64_len).ok()?;

        Some(BufferLayout {
            width,
            height,
            format,
        })
    }

    /// Returns the width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn element(&self) -> ElementType {
        self.format.element
    }

    pub fn color(&self) -> ColorLayout {
        self.format.layout
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    /// The number of samples (channel values) in the buffer.
    pub fn sample_len(&self) -> usize {
        // No overflow due to inner invariant.
        (self.width as usize) * (self.height as usize) * self.channels()
    }

    /// Returns the memory usage as a `u64`.
    pub fn u64_len(&self) -> u64 {
        self.sample_len() as u64 * self.format.element.size() as u64
    }

    /// Returns the memory usage as a `usize`.
    pub fn byte_len(&self) -> usize {
        self.sample_len() * self.format.element.size()
    }

    /// The same dimensions with a different pixel format.
    ///
    /// Returns `None` when the new format overflows the memory invariant,
    /// which can happen when growing the per-pixel size.
    pub fn with_format(&self, format: PixelFormat) -> Option<Self> {
        BufferLayout::new(self.width, self.height, format)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl ImageBuffer {
    /// Allocate a new zeroed image buffer given its layout.
    pub fn with_layout(layout: BufferLayout) -> Self {
        let samples = match layout.element() {
            ElementType::U8 => Samples::U8(vec![0; layout.sample_len()]),
            ElementType::F32 => Samples::F32(vec![0.0; layout.sample_len()]),
        };
        ImageBuffer { layout, samples }
    }

    /// Adopt a byte vector as a `U8` buffer.
    ///
    /// The vector length must equal the layout's byte length and the layout
    /// element must be `U8`.
    pub fn from_u8(layout: BufferLayout, data: Vec<u8>) -> Option<Self> {
        if layout.element() != ElementType::U8 || data.len() != layout.byte_len() {
            return None;
        }
        Some(ImageBuffer {
            layout,
            samples: Samples::U8(data),
        })
    }

    /// Adopt a float vector as an `F32` buffer.
    pub fn from_f32(layout: BufferLayout, data: Vec<f32>) -> Option<Self> {
        if layout.element() != ElementType::F32 || data.len() != layout.sample_len() {
            return None;
        }
        Some(ImageBuffer {
            layout,
            samples: Samples::F32(data),
        })
    }

    /// Adopt raw bytes in either element type, reinterpreting for `F32`.
    pub fn from_bytes(layout: BufferLayout, data: &[u8]) -> Option<Self> {
        if data.len() != layout.byte_len() {
            return None;
        }
        match layout.element() {
            ElementType::U8 => ImageBuffer::from_u8(layout, data.to_vec()),
            ElementType::F32 => {
                let mut floats = vec![0.0f32; layout.sample_len()];
                bytemuck::cast_slice_mut::<f32, u8>(&mut floats).copy_from_slice(data);
                ImageBuffer::from_f32(layout, floats)
            }
        }
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn format(&self) -> PixelFormat {
        self.layout.format
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    /// View the samples as raw bytes, regardless of element type.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.samples {
            Samples::U8(data) => data,
            Samples::F32(data) => bytemuck::cast_slice(data),
        }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.samples {
            Samples::U8(data) => data,
            Samples::F32(data) => bytemuck::cast_slice_mut(data),
        }
    }

    /// The `U8` sample view. `None` for `F32` buffers.
    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.samples {
            Samples::U8(data) => Some(data),
            Samples::F32(_) => None,
        }
    }

    pub fn as_u8_mut(&mut self) -> Option<&mut [u8]> {
        match &mut self.samples {
            Samples::U8(data) => Some(data),
            Samples::F32(_) => None,
        }
    }

    /// The `F32` sample view. `None` for `U8` buffers.
    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.samples {
            Samples::U8(_) => None,
            Samples::F32(data) => Some(data),
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.samples {
            Samples::U8(_) => None,
            Samples::F32(data) => Some(data),
        }
    }

    /// Take the `U8` samples out of the buffer. `None` for `F32` buffers.
    pub fn into_u8(self) -> Option<Vec<u8>> {
        match self.samples {
            Samples::U8(data) => Some(data),
            Samples::F32(_) => None,
        }
    }

    pub fn into_f32(self) -> Option<Vec<f32>> {
        match self.samples {
            Samples::U8(_) => None,
            Samples::F32(data) => Some(data),
        }
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ImageBuffer({}x{} {:?} {:?})",
            self.layout.width,
            self.layout.height,
            self.layout.format.layout,
            self.layout.format.element,
        )
    }
}

#[test]
fn layout_overflow_refused() {
    assert!(BufferLayout::new(u32::MAX, u32::MAX, PixelFormat::RGBA_U8).is_none());
    let layout = BufferLayout::new(16, 16, PixelFormat::RGBA_U8).unwrap();
    assert_eq!(layout.byte_len(), 16 * 16 * 4);
    assert_eq!(layout.sample_len(), 16 * 16 * 4);
    let f32_layout = layout.with_format(PixelFormat::RGBA_F32).unwrap();
    assert_eq!(f32_layout.byte_len(), 16 * 16 * 4 * 4);
}

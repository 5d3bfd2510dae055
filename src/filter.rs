//! The filter abstraction: immutable, thread-shareable operator
//! descriptors.
//!
//! A filter is constructed once, validated eagerly, and then applied from
//! any number of threads concurrently. `apply` never mutates the filter,
//! never writes process-wide state, never retains input references past
//! return, and always produces freshly allocated output.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::buffer::{ElementType, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::geometry::{Value, ValueKind};
use crate::image::Image;
use crate::kernel::convert;
use crate::run::Context;

/// A named, typed input or output of a filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub name: &'static str,
    pub kind: ValueKind,
    pub required: bool,
}

impl Port {
    pub const fn required(name: &'static str, kind: ValueKind) -> Self {
        Port {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ValueKind) -> Self {
        Port {
            name,
            kind,
            required: false,
        }
    }
}

/// Ordered input and output ports of a filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSchema {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl PortSchema {
    /// The default shape: one required image in, one image out.
    pub fn unary_image() -> Self {
        PortSchema {
            inputs: vec![Port::required("input", ValueKind::Image)],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|port| port.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|port| port.name == name)
    }

    /// The primary input: the first declared one.
    pub fn primary_input(&self) -> Option<&Port> {
        self.inputs.first()
    }

    pub fn default_output(&self) -> Option<&Port> {
        self.outputs.first()
    }
}

/// Values keyed by port name, the currency of `apply_multi`.
#[derive(Clone, Debug, Default)]
pub struct PortValues {
    values: BTreeMap<String, Value>,
}

impl PortValues {
    pub fn new() -> Self {
        PortValues::default()
    }

    pub fn single(name: &str, value: Value) -> Self {
        let mut values = PortValues::new();
        values.insert(name, value);
        values
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// A required image input, with the schema-level error when absent.
    pub fn image(&self, name: &str) -> Result<&Image> {
        match self.get(name) {
            Some(Value::Image(image)) => Ok(image),
            Some(other) => Err(Error::invalid_argument(
                "port",
                format!("port `{}` carries {}, expected image", name, other.kind().name()),
            )),
            None => Err(Error::invalid_argument(
                "port",
                format!("missing required port `{}`", name),
            )),
        }
    }
}

impl IntoIterator for PortValues {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// An immutable image operator.
pub trait Filter: Send + Sync {
    /// The unique kind tag, e.g. `gaussian_blur`.
    fn kind(&self) -> &'static str;

    /// The port shape. Unary image-to-image unless overridden.
    fn ports(&self) -> PortSchema {
        PortSchema::unary_image()
    }

    /// The (element, layout) pairs consumed without adaptation.
    fn native_formats(&self) -> Vec<PixelFormat>;

    /// Whether output must come back in the primary input's format.
    fn preserves_format(&self) -> bool {
        true
    }

    /// The parameter record as a serialization document.
    fn params_doc(&self) -> serde_json::Value;

    /// Apply to a single image.
    fn apply(&self, image: &Image, ctx: &Context) -> Result<Image>;

    /// Apply with explicit port bindings. The default wires the unary
    /// contract: primary input in, default output out.
    fn apply_multi(&self, mut inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        let schema = self.ports();
        let primary = schema
            .primary_input()
            .ok_or_else(|| Error::invalid_argument("ports", "filter declares no inputs"))?;
        let input = inputs.take(primary.name).ok_or_else(|| {
            Error::invalid_argument(
                "port",
                format!("missing required port `{}`", primary.name),
            )
        })?;
        let image = match input {
            Value::Image(image) => image,
            other => {
                return Err(Error::invalid_argument(
                    "port",
                    format!(
                        "port `{}` carries {}, expected image",
                        primary.name,
                        other.kind().name()
                    ),
                ))
            }
        };
        let output = self.apply(&image, ctx)?;
        let out_name = schema
            .default_output()
            .map(|port| port.name)
            .unwrap_or("output");
        Ok(PortValues::single(out_name, Value::Image(output)))
    }
}

/// Every wire format, for kernels that are layout-agnostic.
pub(crate) fn all_formats() -> Vec<PixelFormat> {
    use crate::buffer::ColorLayout::*;
    let mut formats = Vec::with_capacity(12);
    for &element in [ElementType::U8, ElementType::F32].iter() {
        for &layout in [Rgb, Rgba, Bgr, Bgra, Gray, Hsv].iter() {
            formats.push(PixelFormat::new(element, layout));
        }
    }
    formats
}

/// The RGB-ordered family in both elements.
pub(crate) fn rgb_family_formats() -> Vec<PixelFormat> {
    use crate::buffer::ColorLayout::*;
    let mut formats = Vec::with_capacity(8);
    for &element in [ElementType::U8, ElementType::F32].iter() {
        for &layout in [Rgb, Rgba, Bgr, Bgra].iter() {
            formats.push(PixelFormat::new(element, layout));
        }
    }
    formats
}

pub(crate) fn alpha_formats() -> Vec<PixelFormat> {
    use crate::buffer::ColorLayout::*;
    let mut formats = Vec::with_capacity(4);
    for &element in [ElementType::U8, ElementType::F32].iter() {
        for &layout in [Rgba, Bgra].iter() {
            formats.push(PixelFormat::new(element, layout));
        }
    }
    formats
}

pub(crate) fn gray_formats() -> Vec<PixelFormat> {
    vec![PixelFormat::GRAY_U8, PixelFormat::GRAY_F32]
}

/// Choose the cheapest native format to adapt `current` into.
///
/// Policy: an exact match wins; otherwise prefer element-preserving
/// conversions, then alpha-preserving ones when the input has alpha, then
/// layout-preserving ones; declaration order breaks ties.
pub(crate) fn choose_native(current: PixelFormat, native: &[PixelFormat]) -> Option<PixelFormat> {
    if native.iter().any(|&format| format == current) {
        return Some(current);
    }
    let score = |candidate: &PixelFormat| -> i32 {
        let mut score = 0;
        if candidate.element == current.element {
            score += 4;
        }
        if current.layout.has_alpha() && candidate.layout.has_alpha() {
            score += 2;
        }
        if candidate.layout == current.layout {
            score += 1;
        }
        score
    };
    native
        .iter()
        .enumerate()
        .max_by_key(|(index, candidate)| (score(candidate), -(*index as i64)))
        .map(|(_, &format)| format)
}

/// Materialize an image in one of the filter's native formats.
///
/// Returns the working buffer and the original format for later
/// restoration.
pub(crate) fn adapt_input(
    image: &Image,
    native: &[PixelFormat],
) -> Result<(ImageBuffer, PixelFormat)> {
    let pixels = image.pixels()?;
    let current = pixels.format();
    let target = choose_native(current, native)
        .ok_or_else(|| Error::layout_mismatch(current, native))?;
    let buffer = if target == current {
        pixels.clone()
    } else {
        convert::convert(pixels, target)?
    };
    Ok((buffer, current))
}

/// Convert a kernel result back to the preserved format when asked to.
///
/// Restoration only applies when the kernel kept the adapted layout; a
/// kernel that deliberately changed shape (grayscale, colormap) keeps its
/// output layout and only the element is restored.
pub(crate) fn restore_format(
    output: ImageBuffer,
    original: PixelFormat,
    preserves: bool,
) -> Result<ImageBuffer> {
    if !preserves {
        return Ok(output);
    }
    if output.format() == original {
        return Ok(output);
    }
    convert::convert(&output, original)
}

/// The spine of a unary filter: adapt, run the kernel, restore, carry
/// metadata over.
pub(crate) fn run_unary(
    filter: &dyn Filter,
    image: &Image,
    kernel: impl FnOnce(&ImageBuffer) -> Result<ImageBuffer>,
) -> Result<Image> {
    let (buffer, original) = adapt_input(image, &filter.native_formats())?;
    let adapted_layout = buffer.format().layout;
    let output = kernel(&buffer)?;
    let output = if output.format().layout == adapted_layout {
        restore_format(output, original, filter.preserves_format())?
    } else {
        // Layout deliberately changed; restore the element only.
        let format = PixelFormat::new(original.element, output.format().layout);
        if output.format() == format {
            output
        } else {
            convert::convert(&output, format)?
        }
    };
    Ok(image.with_buffer_keeping_meta(output))
}

/// A filter wrapped in a reference-counted trait object handle.
pub type FilterRef = Arc<dyn Filter>;

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Filter").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ColorLayout;

    #[test]
    fn native_choice_prefers_element_then_alpha() {
        let native = vec![PixelFormat::RGB_U8, PixelFormat::RGBA_U8, PixelFormat::RGBA_F32];
        // Exact match.
        assert_eq!(
            choose_native(PixelFormat::RGBA_U8, &native),
            Some(PixelFormat::RGBA_U8)
        );
        // BGRA u8: keep element, keep alpha.
        assert_eq!(
            choose_native(
                PixelFormat::new(ElementType::U8, ColorLayout::Bgra),
                &native
            ),
            Some(PixelFormat::RGBA_U8)
        );
        // F32 input with alpha: the f32 candidate wins.
        assert_eq!(
            choose_native(
                PixelFormat::new(ElementType::F32, ColorLayout::Bgra),
                &native
            ),
            Some(PixelFormat::RGBA_F32)
        );
        assert_eq!(choose_native(PixelFormat::GRAY_U8, &[]), None);
    }
}

//! Layer effects on RGBA rasters.
//!
//! Effects differ from plain filters in that they may expand the output
//! canvas; the returned [`EffectOutput`] carries the origin shift of the new
//! canvas relative to the input. Internally everything runs on
//! premultiplied `f32` planes in storage channel order; only the alpha
//! channel position is fixed (index 3), so `Rgba` and `Bgra` share one code
//! path with the effect color swizzled to match.
use crate::buffer::{ImageBuffer, PixelFormat};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::geometry::Rectangle;
use crate::kernel::blend::{self, BlendMode};
use crate::kernel::geometric::fill_samples;
use crate::kernel::morphology::{rank_on_plane, Extremum, StructuringElement};
use crate::kernel::{blur, samples_from_f32, samples_to_f32, EdgeMode};

/// An effect result: the produced canvas plus the position of its origin
/// relative to the input image origin (non-positive when the canvas grew).
#[derive(Debug)]
pub struct EffectOutput {
    pub buffer: ImageBuffer,
    pub shift: (i32, i32),
}

/// The working raster of an effect: four interleaved `f32` channels,
/// premultiplied, alpha at index 3.
struct Raster {
    data: Vec<f32>,
    width: usize,
    height: usize,
}

impl Raster {
    fn of(src: &ImageBuffer) -> Result<Self> {
        if !src.format().layout.has_alpha() {
            return Err(Error::layout_mismatch(
                src.format(),
                &[PixelFormat::RGBA_U8, PixelFormat::RGBA_F32],
            ));
        }
        let mut data = samples_to_f32(src);
        for pixel in data.chunks_exact_mut(4) {
            let alpha = pixel[3];
            pixel[0] *= alpha;
            pixel[1] *= alpha;
            pixel[2] *= alpha;
        }
        Ok(Raster {
            data,
            width: src.width() as usize,
            height: src.height() as usize,
        })
    }

    /// A transparent raster grown by `margin` on every side, with `self`
    /// copied at the offset.
    fn expanded(&self, margin: usize) -> Raster {
        let width = self.width + 2 * margin;
        let height = self.height + 2 * margin;
        let mut data = vec![0.0f32; width * height * 4];
        // The original sits in the grown canvas inset by the margin.
        let placement =
            Rectangle::with_width_height(width as u32, height as u32).inset(margin as u32);
        for (row, y) in (placement.y..placement.max_y).enumerate() {
            let src_row = &self.data[row * self.width * 4..][..self.width * 4];
            let dst_at = (y as usize * width + placement.x as usize) * 4;
            data[dst_at..dst_at + self.width * 4].copy_from_slice(src_row);
        }
        Raster {
            data,
            width,
            height,
        }
    }

    fn alpha_plane(&self) -> Vec<f32> {
        self.data.chunks_exact(4).map(|pixel| pixel[3]).collect()
    }

    /// Un-premultiply and store into a buffer of the given format.
    fn into_buffer(self, format: PixelFormat) -> Result<ImageBuffer> {
        let layout = crate::buffer::BufferLayout::new(self.width as u32, self.height as u32, format)
            .ok_or_else(|| Error::exhausted("pixel buffer layout"))?;
        let mut data = self.data;
        for pixel in data.chunks_exact_mut(4) {
            let alpha = pixel[3];
            if alpha > 0.0 {
                pixel[0] /= alpha;
                pixel[1] /= alpha;
                pixel[2] /= alpha;
            }
        }
        samples_from_f32(layout, data)
    }

    /// Compose `self` (premultiplied) over a premultiplied backdrop layer,
    /// blending color with `mode`. Both rasters share dimensions.
    fn over_backdrop(&mut self, backdrop: &Raster, mode: BlendMode) {
        for (src_px, back_px) in self
            .data
            .chunks_exact_mut(4)
            .zip(backdrop.data.chunks_exact(4))
        {
            let al = src_px[3];
            let ab = back_px[3];
            let ao = al + ab * (1.0 - al);
            let mut out = [0.0f32; 4];
            out[3] = ao;
            for channel in 0..3 {
                // Unpremultiplied operands for the blend function.
                let cs = if al > 0.0 { src_px[channel] / al } else { 0.0 };
                let cb = if ab > 0.0 { back_px[channel] / ab } else { 0.0 };
                let blended = blend::separable(mode, cb, cs);
                out[channel] =
                    al * (1.0 - ab) * cs + al * ab * blended + (1.0 - al) * ab * cb;
            }
            src_px.copy_from_slice(&out);
        }
    }
}

/// Translate a single plane by a fractional offset, bilinear, zero fill.
fn shift_plane(plane: &[f32], width: usize, height: usize, dx: f32, dy: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; plane.len()];
    for y in 0..height {
        for x in 0..width {
            let sx = x as f32 - dx;
            let sy = y as f32 - dy;
            let x0 = sx.floor();
            let y0 = sy.floor();
            let fx = sx - x0;
            let fy = sy - y0;
            let sample = |ix: i64, iy: i64| -> f32 {
                if ix < 0 || iy < 0 || ix >= width as i64 || iy >= height as i64 {
                    0.0
                } else {
                    plane[iy as usize * width + ix as usize]
                }
            };
            let (x0, y0) = (x0 as i64, y0 as i64);
            let top = sample(x0, y0) * (1.0 - fx) + sample(x0 + 1, y0) * fx;
            let bottom = sample(x0, y0 + 1) * (1.0 - fx) + sample(x0 + 1, y0 + 1) * fx;
            out[y * width + x] = top * (1.0 - fy) + bottom * fy;
        }
    }
    out
}

fn blur_plane(plane: &[f32], width: usize, height: usize, sigma: f32) -> Result<Vec<f32>> {
    let weights = blur::gaussian_weights(sigma)?;
    Ok(blur::separable_on_plane(
        plane,
        width as u32,
        height as u32,
        1,
        &weights,
        EdgeMode::Constant(0.0),
    ))
}

fn dilate_plane(plane: &[f32], width: usize, height: usize, amount: u32) -> Result<Vec<f32>> {
    if amount == 0 {
        return Ok(plane.to_vec());
    }
    let element = StructuringElement::rect(2 * amount + 1)?;
    Ok(rank_on_plane(
        plane,
        width as u32,
        height as u32,
        1,
        &element,
        EdgeMode::Constant(0.0),
        Extremum::Max,
    ))
}

fn erode_plane(plane: &[f32], width: usize, height: usize, amount: u32) -> Result<Vec<f32>> {
    if amount == 0 {
        return Ok(plane.to_vec());
    }
    let element = StructuringElement::rect(2 * amount + 1)?;
    Ok(rank_on_plane(
        plane,
        width as u32,
        height as u32,
        1,
        &element,
        EdgeMode::Constant(1.0),
        Extremum::Min,
    ))
}

fn check_opacity(opacity: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(Error::invalid_argument("opacity", "opacity must be within [0, 1]"));
    }
    Ok(())
}

/// The effect color as premultiplied storage-order channels for the given
/// coverage value.
fn colored_pixel(fill: &[f32; 4], coverage: f32) -> [f32; 4] {
    [
        fill[0] * coverage,
        fill[1] * coverage,
        fill[2] * coverage,
        coverage,
    ]
}

/// A raster holding `color` with the given per-pixel coverage.
fn layer_from_coverage(
    coverage: &[f32],
    width: usize,
    height: usize,
    fill: &[f32; 4],
) -> Raster {
    let mut data = vec![0.0f32; width * height * 4];
    for (pixel, &alpha) in data.chunks_exact_mut(4).zip(coverage.iter()) {
        pixel.copy_from_slice(&colored_pixel(fill, alpha));
    }
    Raster {
        data,
        width,
        height,
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DropShadowParams {
    pub offset_x: f32,
    pub offset_y: f32,
    pub sigma: f32,
    /// Dilation of the silhouette before blurring, in pixels.
    pub spread: u32,
    pub color: Color,
    pub opacity: f32,
}

/// Drop shadow behind the layer. Expands the canvas by
/// `ceil(3·sigma) + ceil(max(|offset|)) + 2` per side.
pub fn drop_shadow(src: &ImageBuffer, params: &DropShadowParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let margin = (3.0 * params.sigma).ceil() as usize
        + params.offset_x.abs().max(params.offset_y.abs()).ceil() as usize
        + 2;

    let expanded = raster.expanded(margin);
    let (width, height) = (expanded.width, expanded.height);

    let mut alpha = expanded.alpha_plane();
    alpha = dilate_plane(&alpha, width, height, params.spread)?;
    alpha = blur_plane(&alpha, width, height, params.sigma)?;
    alpha = shift_plane(&alpha, width, height, params.offset_x, params.offset_y);
    for value in alpha.iter_mut() {
        *value *= params.opacity;
    }

    let fill = fill_samples(src.format().layout, params.color);
    let shadow = layer_from_coverage(&alpha, width, height, &fill);

    let mut out = expanded;
    out.over_backdrop(&shadow, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (-(margin as i32), -(margin as i32)),
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InnerShadowParams {
    pub offset_x: f32,
    pub offset_y: f32,
    pub sigma: f32,
    /// Dilation of the inverted silhouette, in pixels.
    pub choke: u32,
    pub color: Color,
    pub opacity: f32,
}

/// Shadow cast onto the layer's own coverage. The canvas is unchanged.
pub fn inner_shadow(src: &ImageBuffer, params: &InnerShadowParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);

    let original = raster.alpha_plane();
    let mut inverted: Vec<f32> = original.iter().map(|&alpha| 1.0 - alpha).collect();
    inverted = dilate_plane(&inverted, width, height, params.choke)?;
    inverted = blur_plane(&inverted, width, height, params.sigma)?;
    inverted = shift_plane(&inverted, width, height, params.offset_x, params.offset_y);
    // Mask with the original coverage.
    for (value, &alpha) in inverted.iter_mut().zip(original.iter()) {
        *value *= alpha * params.opacity;
    }

    let fill = fill_samples(src.format().layout, params.color);
    let shade = layer_from_coverage(&inverted, width, height, &fill);

    let mut out = shade;
    out.over_backdrop(&raster, BlendMode::Normal);
    // The shade layer is transparent outside the mask, so composing it over
    // the original leaves coverage untouched.
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlowParams {
    pub sigma: f32,
    /// Outer glow: silhouette dilation. Inner glow: silhouette erosion.
    pub spread: u32,
    pub color: Color,
    pub opacity: f32,
}

/// Glow radiating outward. Expands the canvas by
/// `ceil(3·sigma) + spread + 2` per side; the original composes on top with
/// "screen".
pub fn outer_glow(src: &ImageBuffer, params: &GlowParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let margin = (3.0 * params.sigma).ceil() as usize + params.spread as usize + 2;
    let expanded = raster.expanded(margin);
    let (width, height) = (expanded.width, expanded.height);

    let original = expanded.alpha_plane();
    let mut glow = dilate_plane(&original, width, height, params.spread)?;
    glow = blur_plane(&glow, width, height, params.sigma)?;
    // Glow lives outside the silhouette.
    for (value, &alpha) in glow.iter_mut().zip(original.iter()) {
        *value = (*value - alpha).max(0.0) * params.opacity;
    }

    let fill = fill_samples(src.format().layout, params.color);
    let halo = layer_from_coverage(&glow, width, height, &fill);

    let mut out = expanded;
    out.over_backdrop(&halo, BlendMode::Screen);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (-(margin as i32), -(margin as i32)),
    })
}

/// Glow radiating inward from the coverage boundary. Canvas unchanged.
pub fn inner_glow(src: &ImageBuffer, params: &GlowParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);

    let original = raster.alpha_plane();
    let eroded = erode_plane(&original, width, height, params.spread)?;
    let blurred = blur_plane(&eroded, width, height, params.sigma)?;
    // Strong near the boundary, fading towards the interior.
    let mut band: Vec<f32> = original
        .iter()
        .zip(blurred.iter())
        .map(|(&alpha, &core)| (alpha - core).max(0.0))
        .collect();
    for (value, &alpha) in band.iter_mut().zip(original.iter()) {
        *value *= alpha * params.opacity;
    }

    let fill = fill_samples(src.format().layout, params.color);
    let halo = layer_from_coverage(&band, width, height, &fill);

    let mut out = halo;
    out.over_backdrop(&raster, BlendMode::Screen);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

/// Bevel styles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BevelStyle {
    InnerBevel,
    OuterBevel,
    Emboss,
    PillowEmboss,
}

impl BevelStyle {
    pub fn name(self) -> &'static str {
        match self {
            BevelStyle::InnerBevel => "inner_bevel",
            BevelStyle::OuterBevel => "outer_bevel",
            BevelStyle::Emboss => "emboss",
            BevelStyle::PillowEmboss => "pillow_emboss",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "inner_bevel" => BevelStyle::InnerBevel,
            "outer_bevel" => BevelStyle::OuterBevel,
            "emboss" => BevelStyle::Emboss,
            "pillow_emboss" => BevelStyle::PillowEmboss,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BevelParams {
    pub style: BevelStyle,
    /// Gradient smoothing sigma, also the shading band width.
    pub sigma: f32,
    /// Surface height scale applied to the alpha gradient.
    pub depth: f32,
    /// Light azimuth, degrees.
    pub angle: f32,
    /// Light altitude above the surface plane, degrees.
    pub altitude: f32,
    pub highlight: Color,
    pub shadow: Color,
    pub opacity: f32,
}

/// Bevel & emboss shading from the alpha surface gradient. Canvas
/// unchanged for all styles; the outer styles shade the dilated band
/// inside the existing canvas.
pub fn bevel_emboss(src: &ImageBuffer, params: &BevelParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);

    let original = raster.alpha_plane();

    // Central-difference gradient of the (blurred) alpha surface.
    let surface = blur_plane(&original, width, height, params.sigma.max(0.5))?;
    let mut shading = vec![0.0f32; width * height];
    let azimuth = params.angle.to_radians();
    let altitude = params.altitude.to_radians();
    let light = [
        azimuth.cos() * altitude.cos(),
        azimuth.sin() * altitude.cos(),
        altitude.sin(),
    ];
    for y in 0..height {
        for x in 0..width {
            let sample = |ix: i64, iy: i64| -> f32 {
                let ix = ix.max(0).min(width as i64 - 1) as usize;
                let iy = iy.max(0).min(height as i64 - 1) as usize;
                surface[iy * width + ix]
            };
            let gx = (sample(x as i64 + 1, y as i64) - sample(x as i64 - 1, y as i64)) / 2.0;
            let gy = (sample(x as i64, y as i64 + 1) - sample(x as i64, y as i64 - 1)) / 2.0;
            // Surface normal of the height field, light from `light`.
            let nx = -gx * params.depth;
            let ny = -gy * params.depth;
            let nz = 1.0f32;
            let norm = (nx * nx + ny * ny + nz * nz).sqrt();
            let lambert = (nx * light[0] + ny * light[1] + nz * light[2]) / norm;
            // Remove the flat-surface response so flat areas stay neutral.
            shading[y * width + x] = lambert - light[2];
        }
    }

    // Style selects where the shading lands and with which sign.
    let dilated = dilate_plane(&original, width, height, params.sigma.ceil() as u32 + 1)?;
    let mut mask: Vec<f32> = match params.style {
        BevelStyle::InnerBevel => original.clone(),
        BevelStyle::OuterBevel => dilated
            .iter()
            .zip(original.iter())
            .map(|(&outer, &alpha)| (outer - alpha).max(0.0))
            .collect(),
        BevelStyle::Emboss | BevelStyle::PillowEmboss => dilated,
    };
    for value in mask.iter_mut() {
        *value *= params.opacity;
    }
    if params.style == BevelStyle::PillowEmboss {
        // Invert the response inside the silhouette.
        for (value, &alpha) in shading.iter_mut().zip(original.iter()) {
            if alpha >= 0.5 {
                *value = -*value;
            }
        }
    }

    let highlight_fill = fill_samples(src.format().layout, params.highlight);
    let shadow_fill = fill_samples(src.format().layout, params.shadow);

    let mut light_cov = vec![0.0f32; width * height];
    let mut dark_cov = vec![0.0f32; width * height];
    for (at, &response) in shading.iter().enumerate() {
        let weighted = response * mask[at];
        if weighted > 0.0 {
            light_cov[at] = weighted.min(1.0);
        } else {
            dark_cov[at] = (-weighted).min(1.0);
        }
    }

    let highlights = layer_from_coverage(&light_cov, width, height, &highlight_fill);
    let shadows = layer_from_coverage(&dark_cov, width, height, &shadow_fill);

    // Shadows first, then highlights, both over the original.
    let mut out = highlights;
    out.over_backdrop(&shadows, BlendMode::Normal);
    out.over_backdrop(&raster, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SatinParams {
    pub offset_x: f32,
    pub offset_y: f32,
    pub sigma: f32,
    pub invert: bool,
    pub color: Color,
    pub opacity: f32,
}

/// Satin: interference of two offset blurred copies of the silhouette,
/// masked to the coverage. Canvas unchanged.
pub fn satin(src: &ImageBuffer, params: &SatinParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);

    let original = raster.alpha_plane();
    let blurred = blur_plane(&original, width, height, params.sigma)?;
    let forward = shift_plane(&blurred, width, height, params.offset_x, params.offset_y);
    let backward = shift_plane(&blurred, width, height, -params.offset_x, -params.offset_y);

    let mut weave: Vec<f32> = forward
        .iter()
        .zip(backward.iter())
        .map(|(&a, &b)| (a - b).abs())
        .collect();
    if params.invert {
        for value in weave.iter_mut() {
            *value = 1.0 - *value;
        }
    }
    for (value, &alpha) in weave.iter_mut().zip(original.iter()) {
        *value = value.max(0.0).min(1.0) * alpha * params.opacity;
    }

    let fill = fill_samples(src.format().layout, params.color);
    let sheen = layer_from_coverage(&weave, width, height, &fill);

    let mut out = sheen;
    out.over_backdrop(&raster, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

/// Where a stroke band sits relative to the coverage boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StrokePosition {
    Outside,
    Inside,
    Center,
}

impl StrokePosition {
    pub fn name(self) -> &'static str {
        match self {
            StrokePosition::Outside => "outside",
            StrokePosition::Inside => "inside",
            StrokePosition::Center => "center",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "outside" => StrokePosition::Outside,
            "inside" => StrokePosition::Inside,
            "center" => StrokePosition::Center,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeParams {
    pub size: u32,
    pub position: StrokePosition,
    pub color: Color,
    pub opacity: f32,
}

/// Stroke the coverage boundary. Expands the canvas for the non-inside
/// positions by the band width.
pub fn stroke(src: &ImageBuffer, params: &StrokeParams) -> Result<EffectOutput> {
    check_opacity(params.opacity)?;
    if params.size == 0 {
        return Err(Error::invalid_argument("size", "stroke size must be at least 1"));
    }
    let raster = Raster::of(src)?;

    let margin = match params.position {
        StrokePosition::Inside => 0usize,
        StrokePosition::Outside => params.size as usize + 1,
        StrokePosition::Center => (params.size as usize + 1) / 2 + 1,
    };
    let expanded = raster.expanded(margin);
    let (width, height) = (expanded.width, expanded.height);
    let original = expanded.alpha_plane();

    let band: Vec<f32> = match params.position {
        StrokePosition::Outside => {
            let grown = dilate_plane(&original, width, height, params.size)?;
            grown
                .iter()
                .zip(original.iter())
                .map(|(&outer, &alpha)| (outer - alpha).max(0.0))
                .collect()
        }
        StrokePosition::Inside => {
            let core = erode_plane(&original, width, height, params.size)?;
            original
                .iter()
                .zip(core.iter())
                .map(|(&alpha, &inner)| (alpha - inner).max(0.0))
                .collect()
        }
        StrokePosition::Center => {
            let half_out = params.size / 2 + params.size % 2;
            let half_in = params.size / 2;
            let grown = dilate_plane(&original, width, height, half_out)?;
            let core = erode_plane(&original, width, height, half_in.max(1))?;
            grown
                .iter()
                .zip(core.iter())
                .map(|(&outer, &inner)| (outer - inner).max(0.0))
                .collect()
        }
    };
    let band: Vec<f32> = band.iter().map(|&value| value * params.opacity).collect();

    let fill = fill_samples(src.format().layout, params.color);
    let ring = layer_from_coverage(&band, width, height, &fill);

    // Inside strokes paint over the layer; outside strokes sit behind it.
    let mut out;
    match params.position {
        StrokePosition::Outside => {
            out = expanded;
            out.over_backdrop(&ring, BlendMode::Normal);
        }
        StrokePosition::Inside | StrokePosition::Center => {
            out = ring;
            out.over_backdrop(&expanded, BlendMode::Normal);
        }
    }
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (-(margin as i32), -(margin as i32)),
    })
}

/// Replace the layer color inside the coverage. Canvas unchanged.
pub fn color_overlay(src: &ImageBuffer, color: Color, opacity: f32) -> Result<EffectOutput> {
    check_opacity(opacity)?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);
    let coverage: Vec<f32> = raster
        .alpha_plane()
        .iter()
        .map(|&alpha| alpha * opacity)
        .collect();
    let fill = fill_samples(src.format().layout, color);
    let mut out = layer_from_coverage(&coverage, width, height, &fill);
    out.over_backdrop(&raster, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

/// Gradient shapes for [`gradient_overlay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GradientStyle {
    Linear,
    Radial,
    Angle,
    Reflected,
    Diamond,
}

impl GradientStyle {
    pub fn name(self) -> &'static str {
        match self {
            GradientStyle::Linear => "linear",
            GradientStyle::Radial => "radial",
            GradientStyle::Angle => "angle",
            GradientStyle::Reflected => "reflected",
            GradientStyle::Diamond => "diamond",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "linear" => GradientStyle::Linear,
            "radial" => GradientStyle::Radial,
            "angle" => GradientStyle::Angle,
            "reflected" => GradientStyle::Reflected,
            "diamond" => GradientStyle::Diamond,
            _ => return None,
        })
    }
}

/// A gradient ramp: numbered color stops on `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientSpec {
    pub style: GradientStyle,
    /// Orientation in degrees where it applies.
    pub angle: f32,
    /// `(position, color)` pairs; positions need not be sorted.
    pub stops: Vec<(f32, Color)>,
    pub reverse: bool,
}

impl GradientSpec {
    fn validate(&self) -> Result<()> {
        if self.stops.is_empty() {
            return Err(Error::invalid_argument("stops", "gradient needs at least one stop"));
        }
        for &(position, _) in &self.stops {
            if !(0.0..=1.0).contains(&position) {
                return Err(Error::invalid_argument(
                    "stops",
                    "gradient stop positions must be within [0, 1]",
                ));
            }
        }
        Ok(())
    }

    /// Color at ramp position `t`.
    fn at(&self, t: f32) -> [f32; 4] {
        let t = if self.reverse { 1.0 - t } else { t };
        let t = t.max(0.0).min(1.0);
        let mut stops: Vec<&(f32, Color)> = self.stops.iter().collect();
        stops.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(core::cmp::Ordering::Equal));

        if t <= stops[0].0 {
            return stops[0].1.to_f32();
        }
        for pair in stops.windows(2) {
            let (p0, c0) = *pair[0];
            let (p1, c1) = *pair[1];
            if t <= p1 {
                let f = if p1 > p0 { (t - p0) / (p1 - p0) } else { 0.0 };
                let a = c0.to_f32();
                let b = c1.to_f32();
                return [
                    a[0] + (b[0] - a[0]) * f,
                    a[1] + (b[1] - a[1]) * f,
                    a[2] + (b[2] - a[2]) * f,
                    a[3] + (b[3] - a[3]) * f,
                ];
            }
        }
        stops[stops.len() - 1].1.to_f32()
    }
}

/// Paint a gradient across the coverage. Canvas unchanged.
pub fn gradient_overlay(
    src: &ImageBuffer,
    spec: &GradientSpec,
    opacity: f32,
) -> Result<EffectOutput> {
    check_opacity(opacity)?;
    spec.validate()?;
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);
    let alpha = raster.alpha_plane();

    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let radians = spec.angle.to_radians();
    let (sin, cos) = (radians.sin(), radians.cos());
    let half_diagonal = (cx * cx + cy * cy).sqrt().max(1.0);

    let layout = src.format().layout;
    let mut data = vec![0.0f32; width * height * 4];
    for y in 0..height {
        for x in 0..width {
            let at = y * width + x;
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let t = match spec.style {
                GradientStyle::Linear => {
                    let along = dx * cos + dy * sin;
                    along / (2.0 * half_diagonal) + 0.5
                }
                GradientStyle::Reflected => {
                    let along = dx * cos + dy * sin;
                    (along.abs()) / half_diagonal
                }
                GradientStyle::Radial => (dx * dx + dy * dy).sqrt() / half_diagonal,
                GradientStyle::Angle => {
                    let theta = dy.atan2(dx) - radians;
                    let turn = theta / (2.0 * core::f32::consts::PI);
                    turn - turn.floor()
                }
                GradientStyle::Diamond => {
                    let rx = dx * cos + dy * sin;
                    let ry = -dx * sin + dy * cos;
                    (rx.abs() + ry.abs()) / half_diagonal
                }
            };
            let rgba = spec.at(t);
            let fill = fill_samples(
                layout,
                Color::new(
                    (rgba[0] * 255.0 + 0.5) as u8,
                    (rgba[1] * 255.0 + 0.5) as u8,
                    (rgba[2] * 255.0 + 0.5) as u8,
                    255,
                ),
            );
            let coverage = alpha[at] * opacity * rgba[3];
            data[at * 4..at * 4 + 4].copy_from_slice(&colored_pixel(&fill, coverage));
        }
    }

    let mut out = Raster {
        data,
        width,
        height,
    };
    out.over_backdrop(&raster, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

/// Tile a pattern over the coverage. Canvas unchanged.
///
/// The pattern is sampled nearest with an integer phase `offset` and a
/// positive integer `scale` magnification.
pub fn pattern_overlay(
    src: &ImageBuffer,
    pattern: &ImageBuffer,
    offset: (i32, i32),
    scale: u32,
    opacity: f32,
) -> Result<EffectOutput> {
    check_opacity(opacity)?;
    if scale == 0 {
        return Err(Error::invalid_argument("scale", "pattern scale must be at least 1"));
    }
    if pattern.width() == 0 || pattern.height() == 0 {
        return Err(Error::invalid_argument("pattern", "pattern must be non-empty"));
    }
    let raster = Raster::of(src)?;
    let (width, height) = (raster.width, raster.height);
    let alpha = raster.alpha_plane();

    // Pattern in the target's storage order.
    let tile = crate::kernel::convert::convert(
        pattern,
        PixelFormat::new(crate::buffer::ElementType::F32, src.format().layout),
    )?;
    let tile_data = tile.as_f32().unwrap_or(&[]);
    let (tile_w, tile_h) = (tile.width() as i64, tile.height() as i64);
    let tile_channels = tile.channels();

    let mut data = vec![0.0f32; width * height * 4];
    for y in 0..height {
        for x in 0..width {
            let at = y * width + x;
            let px = ((x as i64 - i64::from(offset.0)) / i64::from(scale)).rem_euclid(tile_w);
            let py = ((y as i64 - i64::from(offset.1)) / i64::from(scale)).rem_euclid(tile_h);
            let tile_px = &tile_data[(py as usize * tile_w as usize + px as usize) * tile_channels..]
                [..tile_channels];
            let tile_alpha = if tile_channels == 4 { tile_px[3] } else { 1.0 };
            let coverage = alpha[at] * opacity * tile_alpha;
            let pixel = &mut data[at * 4..at * 4 + 4];
            pixel[0] = tile_px[0] * coverage;
            pixel[1] = tile_px[1] * coverage;
            pixel[2] = tile_px[2] * coverage;
            pixel[3] = coverage;
        }
    }

    let mut out = Raster {
        data,
        width,
        height,
    };
    out.over_backdrop(&raster, BlendMode::Normal);
    Ok(EffectOutput {
        buffer: out.into_buffer(src.format())?,
        shift: (0, 0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLayout;

    /// A white opaque square inset in a transparent canvas.
    fn inset_square(size: u32, inset: u32) -> ImageBuffer {
        let layout = BufferLayout::new(size, size, PixelFormat::RGBA_U8).unwrap();
        let mut data = vec![0u8; layout.byte_len()];
        for y in inset..size - inset {
            for x in inset..size - inset {
                let at = ((y * size + x) * 4) as usize;
                data[at..at + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        ImageBuffer::from_u8(layout, data).unwrap()
    }

    #[test]
    fn drop_shadow_expansion_matches_formula() {
        let src = inset_square(100, 10);
        let params = DropShadowParams {
            offset_x: 10.0,
            offset_y: 10.0,
            sigma: 5.0,
            spread: 0,
            color: Color::BLACK,
            opacity: 0.75,
        };
        let out = drop_shadow(&src, &params).unwrap();
        // margin = ceil(15) + ceil(10) + 2 = 27 per side.
        assert_eq!(out.buffer.layout().size(), (154, 154));
        assert_eq!(out.shift, (-27, -27));
    }

    #[test]
    fn inner_effects_keep_canvas() {
        let src = inset_square(32, 4);
        let shadow = inner_shadow(
            &src,
            &InnerShadowParams {
                offset_x: 2.0,
                offset_y: 2.0,
                sigma: 2.0,
                choke: 0,
                color: Color::BLACK,
                opacity: 0.5,
            },
        )
        .unwrap();
        assert_eq!(shadow.buffer.layout().size(), (32, 32));
        assert_eq!(shadow.shift, (0, 0));

        let glow = inner_glow(
            &src,
            &GlowParams {
                sigma: 2.0,
                spread: 1,
                color: Color::WHITE,
                opacity: 0.5,
            },
        )
        .unwrap();
        assert_eq!(glow.buffer.layout().size(), (32, 32));
    }

    #[test]
    fn drop_shadow_darkens_offset_region() {
        let src = inset_square(40, 8);
        let params = DropShadowParams {
            offset_x: 6.0,
            offset_y: 6.0,
            sigma: 2.0,
            spread: 0,
            color: Color::BLACK,
            opacity: 1.0,
        };
        let out = drop_shadow(&src, &params).unwrap();
        let data = out.buffer.as_u8().unwrap();
        let width = out.buffer.width() as usize;
        // Just outside the square's lower-right corner, where the offset
        // shadow lands: alpha should be present.
        let margin = 14usize; // ceil(6) + 6 + 2
        let probe_x = margin + 40 - 8 + 2;
        let probe_y = margin + 40 - 8 + 2;
        let alpha = data[(probe_y * width + probe_x) * 4 + 3];
        assert!(alpha > 0, "expected shadow coverage, got {}", alpha);
    }

    #[test]
    fn effects_require_alpha() {
        let layout = BufferLayout::new(4, 4, PixelFormat::RGB_U8).unwrap();
        let rgb = ImageBuffer::from_u8(layout, vec![0; 48]).unwrap();
        let params = GlowParams {
            sigma: 1.0,
            spread: 0,
            color: Color::WHITE,
            opacity: 1.0,
        };
        assert!(outer_glow(&rgb, &params).is_err());
    }

    #[test]
    fn gradient_ramp_endpoints() {
        let spec = GradientSpec {
            style: GradientStyle::Linear,
            angle: 0.0,
            stops: vec![(0.0, Color::BLACK), (1.0, Color::WHITE)],
            reverse: false,
        };
        let low = spec.at(0.0);
        let high = spec.at(1.0);
        assert_eq!(low[0], 0.0);
        assert_eq!(high[0], 1.0);
        let reversed = GradientSpec {
            reverse: true,
            ..spec
        };
        assert_eq!(reversed.at(0.0)[0], 1.0);
    }

    #[test]
    fn stroke_positions_change_canvas() {
        let src = inset_square(20, 5);
        let outside = stroke(
            &src,
            &StrokeParams {
                size: 2,
                position: StrokePosition::Outside,
                color: Color::BLACK,
                opacity: 1.0,
            },
        )
        .unwrap();
        assert_eq!(outside.buffer.layout().size(), (26, 26));
        assert_eq!(outside.shift, (-3, -3));

        let inside = stroke(
            &src,
            &StrokeParams {
                size: 2,
                position: StrokePosition::Inside,
                color: Color::BLACK,
                opacity: 1.0,
            },
        )
        .unwrap();
        assert_eq!(inside.buffer.layout().size(), (20, 20));
        assert_eq!(inside.shift, (0, 0));
    }
}

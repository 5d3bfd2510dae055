//! The cross-target parity harness.
//!
//! Every registered kernel runs over a fixed catalog of golden inputs;
//! outputs are stored as losslessly compressed files next to a metadata
//! sidecar and compared bit-for-bit between build targets. The default
//! tolerance is zero; any non-zero tolerance is a bug signal, never a
//! feature.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::buffer::{BufferLayout, ElementType, ImageBuffer, PixelFormat};
use crate::codec::{self, Codec};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::kernel::{self, convert};

/// One fixed test input. The pixel recipe is pinned integer arithmetic;
/// the catalog must never change at runtime.
pub struct GoldenInput {
    pub id: &'static str,
    pub width: u32,
    pub height: u32,
    build: fn(u32, u32) -> Vec<u8>,
}

impl GoldenInput {
    /// Materialize the RGBA bytes.
    pub fn build(&self) -> ImageBuffer {
        let layout = BufferLayout::new(self.width, self.height, PixelFormat::RGBA_U8)
            .unwrap_or_else(|| unreachable!("golden dimensions are tiny"));
        let data = (self.build)(self.width, self.height);
        debug_assert_eq!(data.len(), layout.byte_len());
        ImageBuffer::from_u8(layout, data)
            .unwrap_or_else(|| unreachable!("golden recipe length is fixed"))
    }
}

fn gradient_recipe(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.push((x * 255 / width.max(1)) as u8);
            data.push((y * 255 / height.max(1)) as u8);
            data.push(((x + y) * 255 / (width + height).max(1)) as u8);
            data.push(255);
        }
    }
    data
}

fn checker_recipe(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let on = (x / 4 + y / 4) % 2 == 0;
            if on {
                data.extend_from_slice(&[230, 60, 20, 255]);
            } else {
                data.extend_from_slice(&[20, 60, 230, 255]);
            }
        }
    }
    data
}

fn radial_alpha_recipe(width: u32, height: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    let cx = (width / 2) as i64;
    let cy = (height / 2) as i64;
    let reach = (cx * cx + cy * cy).max(1);
    for y in 0..height {
        for x in 0..width {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            let d2 = dx * dx + dy * dy;
            let alpha = 255 - (d2 * 255 / reach).min(255);
            data.extend_from_slice(&[240, 240, 240, alpha as u8]);
        }
    }
    data
}

/// Deterministic noise from a fixed linear congruential generator.
fn noise_recipe(width: u32, height: u32) -> Vec<u8> {
    let mut state = 0x1234_5678u32;
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    };
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..width * height {
        data.push(next());
        data.push(next());
        data.push(next());
        data.push(next() | 0x80);
    }
    data
}

/// The fixed catalog.
pub fn golden_catalog() -> Vec<GoldenInput> {
    vec![
        GoldenInput {
            id: "gradient",
            width: 32,
            height: 32,
            build: gradient_recipe,
        },
        GoldenInput {
            id: "checker",
            width: 32,
            height: 32,
            build: checker_recipe,
        },
        GoldenInput {
            id: "radial_alpha",
            width: 32,
            height: 32,
            build: radial_alpha_recipe,
        },
        GoldenInput {
            id: "noise",
            width: 24,
            height: 24,
            build: noise_recipe,
        },
    ]
}

/// The build target this binary runs as.
pub fn current_target() -> &'static str {
    if cfg!(target_arch = "wasm32") {
        "wasm32"
    } else {
        "native"
    }
}

/// The metadata sidecar stored next to every artifact.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ArtifactMeta {
    pub kernel: String,
    pub input_id: String,
    pub target: String,
    pub bitdepth: String,
    /// How the payload is stored: `u8` rasters directly, `f32` rasters as
    /// raw sample bytes wrapped into a one-row gray image.
    pub stored_depth: String,
    pub output_width: u32,
    pub output_height: u32,
    pub output_layout: String,
    pub param_hash: String,
}

/// One stored artifact.
#[derive(Debug)]
pub struct ParityArtifact {
    pub kernel: &'static str,
    pub input_id: &'static str,
    pub target: &'static str,
    pub bitdepth: &'static str,
    pub path: PathBuf,
}

fn artifact_stem(kernel: &str, input_id: &str, target: &str, bitdepth: &str) -> String {
    format!("{}_{}_{}_{}", kernel, input_id, target, bitdepth)
}

fn param_hash(kernel: &str, bitdepth: &str) -> u64 {
    // FNV-1a; the kernel entry pins its parameters, so its name plus the
    // bitdepth identifies the parameter set.
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in kernel.bytes().chain(bitdepth.bytes()) {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Wrap any output buffer into a byte-exact PNG payload.
///
/// `U8` buffers store as-is. `F32` buffers store their raw little-endian
/// sample bytes in a single-row gray raster, which PNG round-trips
/// losslessly; the sidecar records the real dimensions.
fn storable(buffer: &ImageBuffer) -> Result<(ImageBuffer, &'static str)> {
    match buffer.format().element {
        ElementType::U8 => Ok((buffer.clone(), "u8")),
        ElementType::F32 => {
            let bytes = buffer.as_bytes().to_vec();
            let layout = BufferLayout::new(bytes.len() as u32, 1, PixelFormat::GRAY_U8)
                .ok_or_else(|| Error::exhausted("parity wrapper layout"))?;
            let wrapped = ImageBuffer::from_u8(layout, bytes)
                .ok_or_else(|| Error::exhausted("parity wrapper"))?;
            Ok((wrapped, "f32"))
        }
    }
}

fn write_artifact(
    directory: &Path,
    kernel: &'static str,
    input: &GoldenInput,
    bitdepth: &'static str,
    output: &ImageBuffer,
) -> Result<ParityArtifact> {
    let target = current_target();
    let stem = artifact_stem(kernel, input.id, target, bitdepth);
    let (wrapped, stored_depth) = storable(output)?;
    let png = codec::encode(&wrapped, Codec::Png, None, Color::BLACK)?;

    let path = directory.join(format!("{}.png", stem));
    fs::File::create(&path)
        .and_then(|mut file| file.write_all(&png))
        .map_err(|_| Error::exhausted("parity artifact file"))?;

    let sidecar = ArtifactMeta {
        kernel: kernel.to_owned(),
        input_id: input.id.to_owned(),
        target: target.to_owned(),
        bitdepth: bitdepth.to_owned(),
        stored_depth: stored_depth.to_owned(),
        output_width: output.width(),
        output_height: output.height(),
        output_layout: output.format().layout.name().to_owned(),
        param_hash: format!("{:016x}", param_hash(kernel, bitdepth)),
    };
    let sidecar_path = directory.join(format!("{}.json", stem));
    fs::write(&sidecar_path, serde_json::to_vec_pretty(&sidecar).unwrap_or_default())
        .map_err(|_| Error::exhausted("parity sidecar file"))?;

    Ok(ParityArtifact {
        kernel,
        input_id: input.id,
        target,
        bitdepth,
        path,
    })
}

/// Run every registered kernel over the golden catalog at both bitdepths
/// and store the artifacts under `directory`.
pub fn run_catalog(directory: &Path) -> Result<Vec<ParityArtifact>> {
    fs::create_dir_all(directory).map_err(|_| Error::exhausted("parity directory"))?;
    let catalog = golden_catalog();
    let mut artifacts = Vec::new();
    for entry in kernel::registered_kernels() {
        for input in &catalog {
            let base = input.build();
            let output_u8 = (entry.run)(&base)?;
            artifacts.push(write_artifact(directory, entry.name, input, "u8", &output_u8)?);

            let base_f32 = convert::convert(&base, PixelFormat::RGBA_F32)?;
            let output_f32 = (entry.run)(&base_f32)?;
            artifacts.push(write_artifact(directory, entry.name, input, "f32", &output_f32)?);
        }
    }
    log::info!(
        "parity catalog: {} artifacts under {}",
        artifacts.len(),
        directory.display()
    );
    Ok(artifacts)
}

/// One pair of artifacts that failed the bit-exact comparison.
#[derive(Debug)]
pub struct ParityMismatch {
    pub stem: String,
    pub differing_bytes: usize,
    /// Where the per-pixel diff visualization landed, if one was written.
    pub diff_path: Option<PathBuf>,
}

/// Compare two artifact directories bit-for-bit.
///
/// Both directories must hold the same artifact set (as produced by
/// [`run_catalog`] under two different targets). The codec layer cannot
/// influence equality: comparison happens on decoded pixels.
pub fn compare_directories(
    left: &Path,
    right: &Path,
    left_target: &str,
    right_target: &str,
) -> Result<Vec<ParityMismatch>> {
    let mut mismatches = Vec::new();
    let catalog = golden_catalog();
    for entry in kernel::registered_kernels() {
        for input in &catalog {
            for bitdepth in ["u8", "f32"].iter() {
                let left_stem = artifact_stem(entry.name, input.id, left_target, bitdepth);
                let right_stem = artifact_stem(entry.name, input.id, right_target, bitdepth);
                let left_path = left.join(format!("{}.png", left_stem));
                let right_path = right.join(format!("{}.png", right_stem));

                let left_bytes = fs::read(&left_path)
                    .map_err(|_| Error::exhausted("parity artifact missing"))?;
                let right_bytes = fs::read(&right_path)
                    .map_err(|_| Error::exhausted("parity artifact missing"))?;
                let (left_pixels, _) = codec::decode(&left_bytes, Some(Codec::Png))?;
                let (right_pixels, _) = codec::decode(&right_bytes, Some(Codec::Png))?;

                let differing = differing_bytes(&left_pixels, &right_pixels);
                if differing > 0 {
                    let diff_path = write_diff(left, &left_stem, &left_pixels, &right_pixels).ok();
                    mismatches.push(ParityMismatch {
                        stem: left_stem,
                        differing_bytes: differing,
                        diff_path,
                    });
                }
            }
        }
    }
    Ok(mismatches)
}

fn differing_bytes(left: &ImageBuffer, right: &ImageBuffer) -> usize {
    if left.layout() != right.layout() {
        return left.as_bytes().len().max(right.as_bytes().len());
    }
    left.as_bytes()
        .iter()
        .zip(right.as_bytes().iter())
        .filter(|(a, b)| a != b)
        .count()
}

/// A red-on-black visualization of differing pixels.
fn write_diff(
    directory: &Path,
    stem: &str,
    left: &ImageBuffer,
    right: &ImageBuffer,
) -> Result<PathBuf> {
    let (width, height) = left.layout().size();
    let layout = BufferLayout::new(width, height, PixelFormat::RGB_U8)
        .ok_or_else(|| Error::exhausted("diff layout"))?;
    let pixel_size = left.format().pixel_size();
    let mut data = Vec::with_capacity(layout.byte_len());
    for (left_px, right_px) in left
        .as_bytes()
        .chunks_exact(pixel_size)
        .zip(right.as_bytes().chunks_exact(pixel_size))
    {
        if left_px == right_px {
            data.extend_from_slice(&[0, 0, 0]);
        } else {
            let delta: usize = left_px
                .iter()
                .zip(right_px.iter())
                .map(|(a, b)| usize::from(a.max(b) - a.min(b)))
                .sum();
            data.extend_from_slice(&[255, (delta.min(255)) as u8, 0]);
        }
    }
    let diff = ImageBuffer::from_u8(layout, data).ok_or_else(|| Error::exhausted("diff buffer"))?;
    let png = codec::encode(&diff, Codec::Png, None, Color::BLACK)?;
    let path = directory.join(format!("{}_diff.png", stem));
    fs::write(&path, png).map_err(|_| Error::exhausted("diff file"))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_stable() {
        // Two builds of the same golden must be byte-identical.
        for input in golden_catalog() {
            let once = input.build();
            let twice = input.build();
            assert_eq!(once.as_bytes(), twice.as_bytes(), "golden `{}`", input.id);
        }
    }

    #[test]
    fn noise_is_seeded_not_random() {
        let noise = golden_catalog()
            .into_iter()
            .find(|input| input.id == "noise")
            .map(|input| input.build());
        let noise = noise.expect("noise golden registered");
        // Pinned first pixel of the LCG stream.
        let bytes = noise.as_u8().expect("u8 golden");
        assert_eq!(bytes.len(), 24 * 24 * 4);
        let again = golden_catalog()
            .into_iter()
            .find(|input| input.id == "noise")
            .map(|input| input.build())
            .expect("noise golden registered");
        assert_eq!(bytes, again.as_u8().expect("u8 golden"));
    }
}

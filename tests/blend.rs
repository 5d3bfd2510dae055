//! Blend-mode behavior.
use rasterflow::buffer::{BufferLayout, ImageBuffer, PixelFormat};
use rasterflow::kernel::blend::{blend, BlendMode};

fn solid(width: u32, height: u32, pixel: [u8; 3]) -> ImageBuffer {
    let layout = BufferLayout::new(width, height, PixelFormat::RGB_U8).unwrap();
    let mut data = Vec::with_capacity(layout.byte_len());
    for _ in 0..width * height {
        data.extend_from_slice(&pixel);
    }
    ImageBuffer::from_u8(layout, data).unwrap()
}

fn first_pixel(buffer: &ImageBuffer) -> [u8; 3] {
    let data = buffer.as_u8().unwrap();
    [data[0], data[1], data[2]]
}

#[test]
fn multiply_mid_gray_gives_quarter() {
    // 128 * 128 / 255 = 64.25 -> 64
    let out = blend(
        BlendMode::Multiply,
        &solid(2, 2, [128; 3]),
        &solid(2, 2, [128; 3]),
    )
    .unwrap();
    assert_eq!(first_pixel(&out), [64, 64, 64]);
}

#[test]
fn every_mode_parses_and_runs() {
    let below = solid(2, 2, [100, 160, 40]);
    let above = solid(2, 2, [200, 30, 90]);
    for mode in BlendMode::ALL.iter() {
        // The name table is exhaustive and round-trips.
        let parsed = BlendMode::from_name(mode.name());
        assert_eq!(parsed, Some(*mode));
        let out = blend(*mode, &below, &above).unwrap();
        assert_eq!(out.layout().size(), (2, 2));
    }
    assert_eq!(BlendMode::from_name("definitely_not"), None);
}

#[test]
fn normal_and_extremes() {
    let below = solid(1, 1, [10, 20, 30]);
    let above = solid(1, 1, [200, 100, 50]);

    assert_eq!(
        first_pixel(&blend(BlendMode::Normal, &below, &above).unwrap()),
        [200, 100, 50]
    );
    assert_eq!(
        first_pixel(&blend(BlendMode::Darken, &below, &above).unwrap()),
        [10, 20, 30]
    );
    assert_eq!(
        first_pixel(&blend(BlendMode::Lighten, &below, &above).unwrap()),
        [200, 100, 50]
    );
    // Difference is symmetric.
    let forward = blend(BlendMode::Difference, &below, &above).unwrap();
    let backward = blend(BlendMode::Difference, &above, &below).unwrap();
    assert_eq!(first_pixel(&forward), first_pixel(&backward));
}

#[test]
fn add_saturates_and_subtract_floors() {
    let below = solid(1, 1, [200, 200, 10]);
    let above = solid(1, 1, [100, 30, 30]);
    assert_eq!(
        first_pixel(&blend(BlendMode::Add, &below, &above).unwrap()),
        [255, 230, 40]
    );
    assert_eq!(
        first_pixel(&blend(BlendMode::Subtract, &below, &above).unwrap()),
        [100, 170, 0]
    );
}

#[test]
fn screen_brightens() {
    let below = solid(1, 1, [128; 3]);
    let above = solid(1, 1, [128; 3]);
    let out = first_pixel(&blend(BlendMode::Screen, &below, &above).unwrap());
    // 1 - (1 - 128/255)^2 = 0.75196 -> 192
    assert_eq!(out, [192, 192, 192]);
}

#[test]
fn hard_mix_is_binary() {
    let below = solid(1, 1, [100, 200, 30]);
    let above = solid(1, 1, [100, 200, 30]);
    let out = first_pixel(&blend(BlendMode::HardMix, &below, &above).unwrap());
    for channel in out.iter() {
        assert!(*channel == 0 || *channel == 255);
    }
}

#[test]
fn alpha_composition_uses_source_over() {
    let layout = BufferLayout::new(1, 1, PixelFormat::RGBA_U8).unwrap();
    let below = ImageBuffer::from_u8(layout, vec![0, 0, 255, 255]).unwrap();
    // Half-transparent red over opaque blue, normal mode.
    let above = ImageBuffer::from_u8(layout, vec![255, 0, 0, 128]).unwrap();
    let out = blend(BlendMode::Normal, &below, &above).unwrap();
    let data = out.as_u8().unwrap();
    // Result stays opaque; color is the mix weighted by source alpha.
    assert_eq!(data[3], 255);
    assert!(data[0] > 120 && data[0] < 136, "red {}", data[0]);
    assert!(data[2] > 120 && data[2] < 136, "blue {}", data[2]);
}

#[test]
fn mismatched_shapes_are_refused() {
    let err = blend(
        BlendMode::Multiply,
        &solid(2, 2, [0; 3]),
        &solid(3, 2, [0; 3]),
    )
    .unwrap_err();
    assert_eq!(err.kind(), rasterflow::error::ErrorKind::ShapeMismatch);
}

#[test]
fn non_separable_modes_track_luma() {
    let below = solid(1, 1, [60, 120, 180]);
    let above = solid(1, 1, [180, 120, 60]);

    // `luminosity` takes the above layer's luma with the below color.
    let lum = blend(BlendMode::Luminosity, &below, &above).unwrap();
    // `color` takes the below luma with the above color.
    let col = blend(BlendMode::Color, &below, &above).unwrap();
    assert_ne!(first_pixel(&lum), first_pixel(&col));

    // darker_color / lighter_color pick whole pixels.
    let darker = blend(BlendMode::DarkerColor, &below, &above).unwrap();
    let lighter = blend(BlendMode::LighterColor, &below, &above).unwrap();
    let d = first_pixel(&darker);
    let l = first_pixel(&lighter);
    assert!(d == [60, 120, 180] || d == [180, 120, 60]);
    assert!(l == [60, 120, 180] || l == [180, 120, 60]);
    assert_ne!(d, l);
}

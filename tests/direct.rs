//! Direct kernel and filter scenarios with literal inputs and outputs.
use rasterflow::buffer::{BufferLayout, ColorLayout, ElementType, ImageBuffer, PixelFormat};
use rasterflow::image::MetaValue;
use rasterflow::kernel::convert;
use rasterflow::registry;
use rasterflow::run::Context;
use rasterflow::{Filter, Image};

fn gray_image(width: u32, height: u32, values: &[u8]) -> Image {
    let layout = BufferLayout::new(width, height, PixelFormat::GRAY_U8).unwrap();
    Image::from_buffer(ImageBuffer::from_u8(layout, values.to_vec()).unwrap())
}

fn rgba_image(width: u32, height: u32, values: &[u8]) -> Image {
    let layout = BufferLayout::new(width, height, PixelFormat::RGBA_U8).unwrap();
    Image::from_buffer(ImageBuffer::from_u8(layout, values.to_vec()).unwrap())
}

#[test]
fn threshold_determinism() {
    // 4x4 gray, threshold at 128: values at or above the level saturate.
    let input = gray_image(
        4,
        4,
        &[
            0, 63, 127, 128, //
            129, 200, 255, 10, //
            50, 150, 200, 250, //
            5, 100, 200, 255,
        ],
    );
    let threshold = registry::build_filter("threshold", &serde_json::json!({"value": 128})).unwrap();
    let output = threshold.apply(&input, &Context::new()).unwrap();
    assert_eq!(
        output.pixels().unwrap().as_u8().unwrap(),
        &[
            0, 0, 0, 255, //
            255, 255, 255, 0, //
            0, 255, 255, 255, //
            0, 0, 255, 255,
        ]
    );
}

#[test]
fn resize_then_grayscale_pipeline() {
    // 2x2 RGB: red, green, blue, white. Nearest at 1x1 samples (0, 0).
    let layout = BufferLayout::new(2, 2, PixelFormat::RGB_U8).unwrap();
    let input = Image::from_buffer(
        ImageBuffer::from_u8(
            layout,
            vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255],
        )
        .unwrap(),
    );

    let program = rasterflow::dsl::parse(
        "resize size=(1,1) interpolation=nearest; grayscale method=luminosity",
    )
    .unwrap();
    let pipeline = match program {
        rasterflow::dsl::DslProgram::Pipeline(pipeline) => pipeline,
        _ => panic!("expected a pipeline"),
    };

    let output = pipeline.apply(&input, &Context::new()).unwrap();
    let pixels = output.pixels().unwrap();
    assert_eq!(pixels.format(), PixelFormat::GRAY_U8);
    assert_eq!(pixels.layout().size(), (1, 1));
    // round(0.2126 * 255) = 54
    assert_eq!(pixels.as_u8().unwrap(), &[54]);
}

#[test]
fn drop_shadow_canvas_expansion() {
    // 100x100, opaque white square inset by 10.
    let mut data = vec![0u8; 100 * 100 * 4];
    for y in 10..90 {
        for x in 10..90 {
            let at = (y * 100 + x) * 4;
            data[at..at + 4].copy_from_slice(&[255, 255, 255, 255]);
        }
    }
    let input = rgba_image(100, 100, &data);

    let shadow = registry::build_filter(
        "drop_shadow",
        &serde_json::json!({
            "offset_x": 10, "offset_y": 10, "sigma": 5,
            "color": "#000000", "opacity": 0.75,
        }),
    )
    .unwrap();
    let output = shadow.apply(&input, &Context::new()).unwrap();

    // margin per side: ceil(3*5) + ceil(10) + 2 = 27
    assert_eq!(output.pixels().unwrap().layout().size(), (154, 154));
    assert_eq!(
        output.meta_value("origin_shift"),
        Some(&MetaValue::IntPair(-27, -27))
    );
}

#[test]
fn apply_is_immutable_and_repeatable() {
    let input = gray_image(3, 3, &[10, 20, 30, 40, 50, 60, 70, 80, 90]);
    let before: Vec<u8> = input.pixels().unwrap().as_u8().unwrap().to_vec();

    let blur = registry::build_filter("gaussian_blur", &serde_json::json!({"sigma": 1.0})).unwrap();
    let once = blur.apply(&input, &Context::new()).unwrap();
    let twice = blur.apply(&input, &Context::new()).unwrap();

    let checksum = |image: &Image| {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(image.pixels().unwrap().as_bytes());
        hasher.finalize()
    };
    assert_eq!(checksum(&once), checksum(&twice));
    assert_eq!(input.pixels().unwrap().as_u8().unwrap(), &before[..]);
}

#[test]
fn u8_matches_f32_round_trip_within_one_lsb() {
    let input = rgba_image(
        4,
        4,
        &{
            let mut data = Vec::new();
            for index in 0..16u32 {
                data.push((index * 16) as u8);
                data.push(255 - (index * 13) as u8);
                data.push((index * 7 + 3) as u8);
                data.push((index * 11 + 64).min(255) as u8);
            }
            data
        },
    );

    for (kind, params) in [
        ("invert", serde_json::json!({})),
        ("gaussian_blur", serde_json::json!({"sigma": 1.2})),
        ("contrast", serde_json::json!({"factor": 1.4})),
        ("box_blur", serde_json::json!({"radius": 1})),
    ]
    .iter()
    {
        let filter = registry::build_filter(kind, params).unwrap();

        let direct = filter.apply(&input, &Context::new()).unwrap();
        let direct_bytes = direct.to_format(PixelFormat::RGBA_U8).unwrap();

        let as_f32 = Image::from_buffer(input.to_format(PixelFormat::RGBA_F32).unwrap());
        let through_f32 = filter.apply(&as_f32, &Context::new()).unwrap();
        let round = through_f32.to_format(PixelFormat::RGBA_U8).unwrap();

        for (index, (a, b)) in direct_bytes
            .as_u8()
            .unwrap()
            .iter()
            .zip(round.as_u8().unwrap().iter())
            .enumerate()
        {
            let delta = (i16::from(*a) - i16::from(*b)).abs();
            assert!(
                delta <= 1,
                "kernel `{}` sample {} differs by {} ({} vs {})",
                kind,
                index,
                delta,
                a,
                b
            );
        }
    }
}

#[test]
fn layout_round_trip_is_identity() {
    let layout = BufferLayout::new(3, 2, PixelFormat::RGBA_U8).unwrap();
    let source = ImageBuffer::from_u8(
        layout,
        vec![
            1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, //
            250, 251, 252, 253, 100, 99, 98, 97, 0, 255, 128, 64,
        ],
    )
    .unwrap();

    // Any chain of alpha-preserving swizzles comes back exactly.
    let chain = [
        ColorLayout::Bgra,
        ColorLayout::Rgba,
        ColorLayout::Bgra,
        ColorLayout::Rgba,
    ];
    let mut current = source.clone();
    for &step in chain.iter() {
        current = convert::convert(&current, PixelFormat::new(ElementType::U8, step)).unwrap();
    }
    assert_eq!(current.as_u8(), source.as_u8());

    // Element round trip.
    let through_f32 = convert::convert(&source, PixelFormat::RGBA_F32).unwrap();
    let back = convert::convert(&through_f32, PixelFormat::RGBA_U8).unwrap();
    assert_eq!(back.as_u8(), source.as_u8());
}

#[test]
fn hsv_round_trips_on_exact_hues() {
    // Primaries and neutral gray land on exact HSV encodings.
    let layout = BufferLayout::new(4, 1, PixelFormat::RGB_U8).unwrap();
    let source = ImageBuffer::from_u8(
        layout,
        vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 128, 128, 128],
    )
    .unwrap();
    let hsv = convert::convert(&source, PixelFormat::new(ElementType::U8, ColorLayout::Hsv))
        .unwrap();
    let back = convert::convert(&hsv, PixelFormat::RGB_U8).unwrap();
    assert_eq!(back.as_u8(), source.as_u8());
}

#[test]
fn edge_mode_default_is_clamp() {
    // A flat image blurred with the default edge mode stays flat; a
    // zero-constant border would darken the rim.
    let input = gray_image(4, 4, &[200; 16]);
    let blur = registry::build_filter("box_blur", &serde_json::json!({"radius": 1})).unwrap();
    let output = blur.apply(&input, &Context::new()).unwrap();
    assert_eq!(output.pixels().unwrap().as_u8().unwrap(), &[200; 16]);
}

#[test]
fn invalid_parameters_are_refused_at_construction() {
    use rasterflow::error::ErrorKind;
    let cases = [
        ("gaussian_blur", serde_json::json!({"sigma": -1.0})),
        ("median_blur", serde_json::json!({"size": 4})),
        ("erode", serde_json::json!({"size": 2})),
        ("posterize", serde_json::json!({"levels": 1})),
        ("clahe", serde_json::json!({"clip_limit": 0.2})),
        ("blend", serde_json::json!({"mode": "not_a_mode"})),
    ];
    for (kind, params) in cases.iter() {
        let err = registry::build_filter(kind, params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "kind `{}`", kind);
    }
}

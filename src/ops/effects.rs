//! Layer-effect filters.
//!
//! Effects may expand the canvas; the origin shift of the produced canvas
//! is reported to the caller through the image metadata key
//! `origin_shift`.
use std::sync::Arc;

use serde_json::json;

use crate::buffer::{ImageBuffer, PixelFormat};
use crate::color::Color;
use crate::error::{Error, Result};
use crate::filter::{adapt_input, alpha_formats, Filter, Port, PortSchema, PortValues};
use crate::geometry::{Value, ValueKind};
use crate::image::{Image, MetaValue};
use crate::kernel::convert;
use crate::kernel::effects::{
    self, BevelParams, BevelStyle, DropShadowParams, EffectOutput, GlowParams, GradientSpec,
    GradientStyle, InnerShadowParams, SatinParams, StrokeParams, StrokePosition,
};
use crate::ops::Params;
use crate::registry::Registration;
use crate::run::Context;

/// The metadata key effects report their canvas origin under.
pub const ORIGIN_SHIFT_KEY: &str = "origin_shift";

/// Adapt, run, restore, and attach the origin shift.
fn run_effect(
    image: &Image,
    kernel: impl FnOnce(&ImageBuffer) -> Result<EffectOutput>,
) -> Result<Image> {
    let (buffer, original) = adapt_input(image, &alpha_formats())?;
    let output = kernel(&buffer)?;
    let restored = convert::convert(&output.buffer, original)?;
    Ok(image
        .with_buffer_keeping_meta(restored)
        .with_meta(
            ORIGIN_SHIFT_KEY,
            MetaValue::IntPair(i64::from(output.shift.0), i64::from(output.shift.1)),
        ))
}

macro_rules! effect_filter {
    ($name:ident, $kind:literal, $params_ty:ty, $kernel:path, $doc_fn:expr) => {
        pub struct $name {
            params: $params_ty,
        }

        impl $name {
            pub fn new(params: $params_ty) -> Result<Self> {
                Ok($name { params })
            }
        }

        impl Filter for $name {
            fn kind(&self) -> &'static str {
                $kind
            }

            fn native_formats(&self) -> Vec<PixelFormat> {
                alpha_formats()
            }

            fn preserves_format(&self) -> bool {
                false
            }

            fn params_doc(&self) -> serde_json::Value {
                let doc_fn: fn(&$params_ty) -> serde_json::Value = $doc_fn;
                doc_fn(&self.params)
            }

            fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
                run_effect(image, |buffer| $kernel(buffer, &self.params))
            }
        }
    };
}

effect_filter!(
    DropShadow,
    "drop_shadow",
    DropShadowParams,
    effects::drop_shadow,
    |params| json!({
        "offset_x": params.offset_x,
        "offset_y": params.offset_y,
        "sigma": params.sigma,
        "spread": params.spread,
        "color": params.color.to_hex(),
        "opacity": params.opacity,
    })
);

effect_filter!(
    InnerShadow,
    "inner_shadow",
    InnerShadowParams,
    effects::inner_shadow,
    |params| json!({
        "offset_x": params.offset_x,
        "offset_y": params.offset_y,
        "sigma": params.sigma,
        "choke": params.choke,
        "color": params.color.to_hex(),
        "opacity": params.opacity,
    })
);

effect_filter!(
    OuterGlow,
    "outer_glow",
    GlowParams,
    effects::outer_glow,
    |params| json!({
        "sigma": params.sigma,
        "spread": params.spread,
        "color": params.color.to_hex(),
        "opacity": params.opacity,
    })
);

effect_filter!(
    InnerGlow,
    "inner_glow",
    GlowParams,
    effects::inner_glow,
    |params| json!({
        "sigma": params.sigma,
        "spread": params.spread,
        "color": params.color.to_hex(),
        "opacity": params.opacity,
    })
);

effect_filter!(
    BevelEmboss,
    "bevel_emboss",
    BevelParams,
    effects::bevel_emboss,
    |params| json!({
        "style": params.style.name(),
        "sigma": params.sigma,
        "depth": params.depth,
        "angle": params.angle,
        "altitude": params.altitude,
        "highlight": params.highlight.to_hex(),
        "shadow": params.shadow.to_hex(),
        "opacity": params.opacity,
    })
);

effect_filter!(Satin, "satin", SatinParams, effects::satin, |params| json!({
    "offset_x": params.offset_x,
    "offset_y": params.offset_y,
    "sigma": params.sigma,
    "invert": params.invert,
    "color": params.color.to_hex(),
    "opacity": params.opacity,
}));

effect_filter!(
    Stroke,
    "stroke",
    StrokeParams,
    effects::stroke,
    |params| json!({
        "size": params.size,
        "position": params.position.name(),
        "color": params.color.to_hex(),
        "opacity": params.opacity,
    })
);

/// Replace the layer color within its own coverage.
pub struct ColorOverlay {
    color: Color,
    opacity: f32,
}

impl ColorOverlay {
    pub fn new(color: Color, opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::invalid_argument("opacity", "opacity must be within [0, 1]"));
        }
        Ok(ColorOverlay { color, opacity })
    }
}

impl Filter for ColorOverlay {
    fn kind(&self) -> &'static str {
        "color_overlay"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({ "color": self.color.to_hex(), "opacity": self.opacity })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_effect(image, |buffer| {
            effects::color_overlay(buffer, self.color, self.opacity)
        })
    }
}

/// Paint a gradient across the coverage.
pub struct GradientOverlay {
    spec: GradientSpec,
    opacity: f32,
}

impl GradientOverlay {
    pub fn new(spec: GradientSpec, opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::invalid_argument("opacity", "opacity must be within [0, 1]"));
        }
        if spec.stops.is_empty() {
            return Err(Error::invalid_argument("stops", "gradient needs at least one stop"));
        }
        Ok(GradientOverlay { spec, opacity })
    }
}

impl Filter for GradientOverlay {
    fn kind(&self) -> &'static str {
        "gradient_overlay"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "style": self.spec.style.name(),
            "angle": self.spec.angle,
            "stops": self
                .spec
                .stops
                .iter()
                .map(|(position, color)| json!([position, color.to_hex()]))
                .collect::<Vec<_>>(),
            "reverse": self.spec.reverse,
            "opacity": self.opacity,
        })
    }

    fn apply(&self, image: &Image, _: &Context) -> Result<Image> {
        run_effect(image, |buffer| {
            effects::gradient_overlay(buffer, &self.spec, self.opacity)
        })
    }
}

/// Tile a pattern across the coverage; the pattern arrives on its own
/// input port.
pub struct PatternOverlay {
    offset: (i32, i32),
    scale: u32,
    opacity: f32,
}

impl PatternOverlay {
    pub fn new(offset: (i32, i32), scale: u32, opacity: f32) -> Result<Self> {
        if scale == 0 {
            return Err(Error::invalid_argument("scale", "pattern scale must be at least 1"));
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(Error::invalid_argument("opacity", "opacity must be within [0, 1]"));
        }
        Ok(PatternOverlay {
            offset,
            scale,
            opacity,
        })
    }
}

impl Filter for PatternOverlay {
    fn kind(&self) -> &'static str {
        "pattern_overlay"
    }

    fn ports(&self) -> PortSchema {
        PortSchema {
            inputs: vec![
                Port::required("input", ValueKind::Image),
                Port::required("pattern", ValueKind::Image),
            ],
            outputs: vec![Port::required("output", ValueKind::Image)],
        }
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        alpha_formats()
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        json!({
            "offset": [self.offset.0, self.offset.1],
            "scale": self.scale,
            "opacity": self.opacity,
        })
    }

    fn apply(&self, _: &Image, _: &Context) -> Result<Image> {
        Err(Error::invalid_argument(
            "inputs",
            "pattern_overlay is a combiner; bind both `input` and `pattern` ports",
        ))
    }

    fn apply_multi(&self, inputs: PortValues, ctx: &Context) -> Result<PortValues> {
        ctx.check_cancelled()?;
        let image = inputs.image("input")?;
        let pattern = inputs.image("pattern")?.pixels()?.clone();
        let output = run_effect(image, |buffer| {
            effects::pattern_overlay(buffer, &pattern, self.offset, self.scale, self.opacity)
        })?;
        Ok(PortValues::single("output", Value::Image(output)))
    }
}

fn opacity_of(params: &Params<'_>) -> Result<f32> {
    params.f32_or("opacity", 1.0)
}

pub(crate) fn registrations() -> Vec<Registration> {
    vec![
        Registration {
            kind: "drop_shadow",
            positional: &["offset_x", "offset_y", "sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let parsed = DropShadowParams {
                    offset_x: params.f32_or("offset_x", 4.0)?,
                    offset_y: params.f32_or("offset_y", 4.0)?,
                    sigma: params.f32_or("sigma", 3.0)?,
                    spread: params.u32_or("spread", 0)?,
                    color: params.color_or("color", Color::BLACK)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                crate::kernel::blur::gaussian_weights(parsed.sigma)?;
                Ok(Arc::new(DropShadow::new(parsed)?))
            },
        },
        Registration {
            kind: "inner_shadow",
            positional: &["offset_x", "offset_y", "sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let parsed = InnerShadowParams {
                    offset_x: params.f32_or("offset_x", 4.0)?,
                    offset_y: params.f32_or("offset_y", 4.0)?,
                    sigma: params.f32_or("sigma", 3.0)?,
                    choke: params.u32_or("choke", 0)?,
                    color: params.color_or("color", Color::BLACK)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                crate::kernel::blur::gaussian_weights(parsed.sigma)?;
                Ok(Arc::new(InnerShadow::new(parsed)?))
            },
        },
        Registration {
            kind: "outer_glow",
            positional: &["sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let parsed = GlowParams {
                    sigma: params.f32_or("sigma", 3.0)?,
                    spread: params.u32_or("spread", 0)?,
                    color: params.color_or("color", Color::WHITE)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                crate::kernel::blur::gaussian_weights(parsed.sigma)?;
                Ok(Arc::new(OuterGlow::new(parsed)?))
            },
        },
        Registration {
            kind: "inner_glow",
            positional: &["sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let parsed = GlowParams {
                    sigma: params.f32_or("sigma", 3.0)?,
                    spread: params.u32_or("spread", 0)?,
                    color: params.color_or("color", Color::WHITE)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                crate::kernel::blur::gaussian_weights(parsed.sigma)?;
                Ok(Arc::new(InnerGlow::new(parsed)?))
            },
        },
        Registration {
            kind: "bevel_emboss",
            positional: &["style"],
            build: |doc| {
                let params = Params::new(doc)?;
                let style = params.string_or("style", "inner_bevel")?;
                let parsed = BevelParams {
                    style: BevelStyle::from_name(&style).ok_or_else(|| {
                        Error::invalid_argument("style", format!("unknown bevel style `{}`", style))
                    })?,
                    sigma: params.f32_or("sigma", 3.0)?,
                    depth: params.f32_or("depth", 1.0)?,
                    angle: params.f32_or("angle", 120.0)?,
                    altitude: params.f32_or("altitude", 30.0)?,
                    highlight: params.color_or("highlight", Color::WHITE)?,
                    shadow: params.color_or("shadow", Color::BLACK)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                Ok(Arc::new(BevelEmboss::new(parsed)?))
            },
        },
        Registration {
            kind: "satin",
            positional: &["offset_x", "offset_y", "sigma"],
            build: |doc| {
                let params = Params::new(doc)?;
                let parsed = SatinParams {
                    offset_x: params.f32_or("offset_x", 4.0)?,
                    offset_y: params.f32_or("offset_y", 4.0)?,
                    sigma: params.f32_or("sigma", 3.0)?,
                    invert: params.bool_or("invert", false)?,
                    color: params.color_or("color", Color::BLACK)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                crate::kernel::blur::gaussian_weights(parsed.sigma)?;
                Ok(Arc::new(Satin::new(parsed)?))
            },
        },
        Registration {
            kind: "stroke",
            positional: &["size", "position"],
            build: |doc| {
                let params = Params::new(doc)?;
                let position = params.string_or("position", "outside")?;
                let parsed = StrokeParams {
                    size: params.u32_or("size", 1)?,
                    position: StrokePosition::from_name(&position).ok_or_else(|| {
                        Error::invalid_argument(
                            "position",
                            format!("unknown stroke position `{}`", position),
                        )
                    })?,
                    color: params.color_or("color", Color::BLACK)?,
                    opacity: opacity_of(&params)?,
                };
                params.finish()?;
                if parsed.size == 0 {
                    return Err(Error::invalid_argument("size", "stroke size must be at least 1"));
                }
                Ok(Arc::new(Stroke::new(parsed)?))
            },
        },
        Registration {
            kind: "color_overlay",
            positional: &["color", "opacity"],
            build: |doc| {
                let params = Params::new(doc)?;
                let color = params.color_or("color", Color::WHITE)?;
                let opacity = opacity_of(&params)?;
                params.finish()?;
                Ok(Arc::new(ColorOverlay::new(color, opacity)?))
            },
        },
        Registration {
            kind: "gradient_overlay",
            positional: &["style", "angle"],
            build: |doc| {
                let params = Params::new(doc)?;
                let style = params.string_or("style", "linear")?;
                let angle = params.f32_or("angle", 90.0)?;
                let reverse = params.bool_or("reverse", false)?;
                let opacity = opacity_of(&params)?;
                let stops = parse_stops(doc)?;
                // `stops` was read manually above.
                params.allow("stops");
                params.finish()?;
                let spec = GradientSpec {
                    style: GradientStyle::from_name(&style).ok_or_else(|| {
                        Error::invalid_argument("style", format!("unknown gradient style `{}`", style))
                    })?,
                    angle,
                    stops,
                    reverse,
                };
                Ok(Arc::new(GradientOverlay::new(spec, opacity)?))
            },
        },
        Registration {
            kind: "pattern_overlay",
            positional: &["scale"],
            build: |doc| {
                let params = Params::new(doc)?;
                let offset_x = params.i32_or("offset_x", 0)?;
                let offset_y = params.i32_or("offset_y", 0)?;
                let scale = params.u32_or("scale", 1)?;
                let opacity = opacity_of(&params)?;
                params.finish()?;
                Ok(Arc::new(PatternOverlay::new(
                    (offset_x, offset_y),
                    scale,
                    opacity,
                )?))
            },
        },
    ]
}

/// Gradient stops: `[[position, "#rrggbb"], …]`; a missing key means the
/// default black-to-white ramp.
fn parse_stops(doc: &serde_json::Value) -> Result<Vec<(f32, Color)>> {
    let stops = match doc.get("stops") {
        None => return Ok(vec![(0.0, Color::BLACK), (1.0, Color::WHITE)]),
        Some(serde_json::Value::Array(items)) => items,
        Some(_) => {
            return Err(Error::invalid_argument(
                "stops",
                "gradient stops must be an array of [position, color] pairs",
            ))
        }
    };
    let mut parsed = Vec::with_capacity(stops.len());
    for stop in stops {
        let pair = stop.as_array().filter(|pair| pair.len() == 2).ok_or_else(|| {
            Error::invalid_argument("stops", "each gradient stop is a [position, color] pair")
        })?;
        let position = pair[0].as_f64().map(|value| value as f32).ok_or_else(|| {
            Error::invalid_argument("stops", "gradient stop positions must be numbers")
        })?;
        if !(0.0..=1.0).contains(&position) {
            return Err(Error::invalid_argument(
                "stops",
                "gradient stop positions must be within [0, 1]",
            ));
        }
        let color = pair[1]
            .as_str()
            .and_then(Color::from_hex)
            .ok_or_else(|| Error::invalid_argument("stops", "gradient stop colors must be #rrggbb"))?;
        parsed.push((position, color));
    }
    if parsed.is_empty() {
        return Err(Error::invalid_argument("stops", "gradient needs at least one stop"));
    }
    Ok(parsed)
}

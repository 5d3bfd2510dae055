//! The filter catalog: one immutable descriptor struct per kind tag.
//!
//! Construction validates parameters eagerly; serialization documents are
//! parsed strictly (unknown keys refuse the document). Value-like
//! parameters (thresholds, offsets into sample space) accept either
//! normalized fractions or byte-scale numbers: any magnitude above one is
//! divided by 255 at construction.
pub mod alpha;
pub mod blend;
pub mod blur;
pub mod convert;
pub mod edge;
pub mod effects;
pub mod geometric;
pub mod histogram;
pub mod morph;
pub mod point;
pub mod regions;

use core::convert::TryFrom;
use std::cell::RefCell;
use std::collections::BTreeSet;

use serde_json::{Map, Value as Doc};

use crate::color::Color;
use crate::error::{Error, Result};
use crate::kernel::EdgeMode;

/// Strict accessor over a parameter document.
///
/// Every read marks its key; [`Params::finish`] refuses documents with
/// keys nobody asked for.
pub(crate) struct Params<'a> {
    map: Option<&'a Map<String, Doc>>,
    seen: RefCell<BTreeSet<String>>,
}

impl<'a> Params<'a> {
    pub fn new(doc: &'a Doc) -> Result<Self> {
        let map = match doc {
            Doc::Object(map) => Some(map),
            Doc::Null => None,
            _ => {
                return Err(Error::invalid_argument(
                    "params",
                    "parameter record must be an object",
                ))
            }
        };
        Ok(Params {
            map,
            seen: RefCell::new(BTreeSet::new()),
        })
    }

    fn fetch(&self, key: &str) -> Option<&'a Doc> {
        self.seen.borrow_mut().insert(key.to_owned());
        self.map.and_then(|map| map.get(key))
    }

    /// Mark a key as consumed by an out-of-band reader.
    pub fn allow(&self, key: &str) {
        let _ = self.fetch(key);
    }

    pub fn f32_or(&self, key: &str, default: f32) -> Result<f32> {
        match self.fetch(key) {
            None => Ok(default),
            Some(doc) => doc
                .as_f64()
                .map(|value| value as f32)
                .ok_or_else(|| Error::invalid_argument("params", format!("`{}` must be a number", key))),
        }
    }

    pub fn f32(&self, key: &str) -> Result<f32> {
        match self.fetch(key) {
            None => Err(Error::invalid_argument(
                "params",
                format!("missing required parameter `{}`", key),
            )),
            Some(doc) => doc
                .as_f64()
                .map(|value| value as f32)
                .ok_or_else(|| Error::invalid_argument("params", format!("`{}` must be a number", key))),
        }
    }

    pub fn u32_or(&self, key: &str, default: u32) -> Result<u32> {
        match self.fetch(key) {
            None => Ok(default),
            Some(doc) => doc
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| {
                    Error::invalid_argument("params", format!("`{}` must be a non-negative integer", key))
                }),
        }
    }

    pub fn u32(&self, key: &str) -> Result<u32> {
        match self.fetch(key) {
            None => Err(Error::invalid_argument(
                "params",
                format!("missing required parameter `{}`", key),
            )),
            Some(doc) => doc
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .ok_or_else(|| {
                    Error::invalid_argument("params", format!("`{}` must be a non-negative integer", key))
                }),
        }
    }

    pub fn i32_or(&self, key: &str, default: i32) -> Result<i32> {
        match self.fetch(key) {
            None => Ok(default),
            Some(doc) => doc
                .as_i64()
                .and_then(|value| i32::try_from(value).ok())
                .ok_or_else(|| Error::invalid_argument("params", format!("`{}` must be an integer", key))),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.fetch(key) {
            None => Ok(default),
            Some(doc) => doc
                .as_bool()
                .ok_or_else(|| Error::invalid_argument("params", format!("`{}` must be a boolean", key))),
        }
    }

    pub fn string_or(&self, key: &str, default: &str) -> Result<String> {
        match self.fetch(key) {
            None => Ok(default.to_owned()),
            Some(doc) => doc
                .as_str()
                .map(str::to_owned)
                .ok_or_else(|| Error::invalid_argument("params", format!("`{}` must be a string", key))),
        }
    }

    pub fn color_or(&self, key: &str, default: Color) -> Result<Color> {
        match self.fetch(key) {
            None => Ok(default),
            Some(doc) => doc
                .as_str()
                .and_then(Color::from_hex)
                .ok_or_else(|| {
                    Error::invalid_argument("params", format!("`{}` must be a #rrggbb color", key))
                }),
        }
    }

    /// A pair like `[w, h]`, with a default when absent.
    pub fn size_or(&self, key: &str, default: (u32, u32)) -> Result<(u32, u32)> {
        if self.fetch(key).is_none() {
            return Ok(default);
        }
        self.size(key)
    }

    /// A pair like `[w, h]`.
    pub fn size(&self, key: &str) -> Result<(u32, u32)> {
        match self.fetch(key) {
            None => Err(Error::invalid_argument(
                "params",
                format!("missing required parameter `{}`", key),
            )),
            Some(Doc::Array(items)) if items.len() == 2 => {
                let mut pair = [0u32; 2];
                for (slot, item) in pair.iter_mut().zip(items.iter()) {
                    *slot = item
                        .as_u64()
                        .and_then(|value| u32::try_from(value).ok())
                        .ok_or_else(|| {
                            Error::invalid_argument(
                                "params",
                                format!("`{}` entries must be non-negative integers", key),
                            )
                        })?;
                }
                Ok((pair[0], pair[1]))
            }
            Some(_) => Err(Error::invalid_argument(
                "params",
                format!("`{}` must be a [width, height] pair", key),
            )),
        }
    }

    /// A flat list of `2·n` coordinates.
    pub fn points(&self, key: &str, n: usize) -> Result<Vec<(f32, f32)>> {
        match self.fetch(key) {
            None => Err(Error::invalid_argument(
                "params",
                format!("missing required parameter `{}`", key),
            )),
            Some(Doc::Array(items)) if items.len() == 2 * n => {
                let mut flat = Vec::with_capacity(2 * n);
                for item in items {
                    flat.push(item.as_f64().map(|value| value as f32).ok_or_else(|| {
                        Error::invalid_argument("params", format!("`{}` entries must be numbers", key))
                    })?);
                }
                Ok(flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
            }
            Some(_) => Err(Error::invalid_argument(
                "params",
                format!("`{}` must hold {} coordinates", key, 2 * n),
            )),
        }
    }

    /// The shared edge-mode parameter pair `edge` / `edge_value`.
    pub fn edge_mode(&self) -> Result<EdgeMode> {
        let name = self.string_or("edge", "clamp")?;
        let value = self.f32_or("edge_value", 0.0)?;
        Ok(match name.as_str() {
            "clamp" => EdgeMode::Clamp,
            "reflect" => EdgeMode::Reflect,
            "wrap" => EdgeMode::Wrap,
            "constant" => EdgeMode::Constant(value),
            other => {
                return Err(Error::invalid_argument(
                    "edge",
                    format!("unknown edge mode `{}`", other),
                ))
            }
        })
    }

    /// Refuse unknown keys. Call after reading everything.
    pub fn finish(&self) -> Result<()> {
        if let Some(map) = self.map {
            let seen = self.seen.borrow();
            for key in map.keys() {
                if !seen.contains(key) {
                    return Err(Error::invalid_argument(
                        "params",
                        format!("unknown parameter `{}`", key),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Serialize an edge mode into a document under the shared keys.
pub(crate) fn edge_mode_doc(map: &mut Map<String, Doc>, mode: EdgeMode) {
    map.insert("edge".to_owned(), Doc::from(mode.name()));
    if let EdgeMode::Constant(value) = mode {
        map.insert("edge_value".to_owned(), Doc::from(value as f64));
    }
}

/// Normalize a value-like parameter: byte-scale magnitudes become
/// fractions.
pub(crate) fn normalize_level(value: f32) -> f32 {
    if value.abs() > 1.0 {
        value / 255.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_keys_are_refused() {
        let doc = json!({"sigma": 1.5, "bogus": true});
        let params = Params::new(&doc).unwrap();
        assert_eq!(params.f32("sigma").unwrap(), 1.5);
        let err = params.finish().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn defaults_apply_on_missing_keys() {
        let doc = json!({});
        let params = Params::new(&doc).unwrap();
        assert_eq!(params.f32_or("sigma", 2.0).unwrap(), 2.0);
        assert_eq!(params.edge_mode().unwrap(), EdgeMode::Clamp);
        params.finish().unwrap();
    }

    #[test]
    fn level_normalization() {
        assert_eq!(normalize_level(0.5), 0.5);
        assert_eq!(normalize_level(128.0), 128.0 / 255.0);
        assert_eq!(normalize_level(1.0), 1.0);
    }
}

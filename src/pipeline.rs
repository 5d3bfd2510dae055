//! A linear chain of filters, itself usable as a filter.
use std::sync::Arc;

use crate::buffer::PixelFormat;
use crate::error::Result;
use crate::filter::{all_formats, Filter, FilterRef};
use crate::image::Image;
use crate::run::Context;

/// An ordered, possibly empty sequence of filters.
///
/// Between adjacent filters the engine inserts the cheapest layout
/// conversion satisfying the downstream filter's native-format set; that
/// adaptation lives in the filter layer itself
/// ([`crate::filter::adapt_input`]), so chaining here reduces to threading
/// the value through with a cancellation check per stage.
#[derive(Clone, Default, Debug)]
pub struct Pipeline {
    filters: Vec<FilterRef>,
}

impl Pipeline {
    pub fn new(filters: Vec<FilterRef>) -> Self {
        Pipeline { filters }
    }

    pub fn empty() -> Self {
        Pipeline::default()
    }

    pub fn push(&mut self, filter: FilterRef) {
        self.filters.push(filter);
    }

    /// Builder-style append.
    pub fn then(mut self, filter: FilterRef) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[FilterRef] {
        &self.filters
    }

    /// Wrap into a shareable filter handle.
    pub fn into_ref(self) -> FilterRef {
        Arc::new(self)
    }
}

impl Filter for Pipeline {
    fn kind(&self) -> &'static str {
        "pipeline"
    }

    fn native_formats(&self) -> Vec<PixelFormat> {
        // The first stage adapts for itself; an empty chain is identity.
        match self.filters.first() {
            Some(filter) => filter.native_formats(),
            None => all_formats(),
        }
    }

    fn preserves_format(&self) -> bool {
        false
    }

    fn params_doc(&self) -> serde_json::Value {
        serde_json::json!({
            "filters": self
                .filters
                .iter()
                .map(|filter| crate::ser::filter_to_doc(filter.as_ref()))
                .collect::<Vec<_>>(),
        })
    }

    fn apply(&self, image: &Image, ctx: &Context) -> Result<Image> {
        let mut current = image.clone();
        for filter in &self.filters {
            ctx.check_cancelled()?;
            log::trace!("pipeline stage `{}`", filter.kind());
            current = filter.apply(&current, ctx)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLayout, ImageBuffer};

    #[test]
    fn empty_pipeline_is_identity() {
        let layout = BufferLayout::new(2, 2, PixelFormat::GRAY_U8).unwrap();
        let image = Image::from_buffer(
            ImageBuffer::from_u8(layout, vec![1, 2, 3, 4]).unwrap(),
        );
        let out = Pipeline::empty().apply(&image, &Context::new()).unwrap();
        assert_eq!(out.pixels().unwrap().as_u8(), image.pixels().unwrap().as_u8());
    }
}

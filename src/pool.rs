//! Holds a number of image values and hands them to executions by key.
//!
//! The pool is the embedder-side store: images enter once, get a stable
//! key, and are bound to graph sources by name at execution time. Entries
//! are plain [`Image`] values, so binding clones structurally (shared
//! compressed bytes, shared metadata) rather than copying pixels.
use core::fmt;

use std::collections::BTreeMap;

use slotmap::{DefaultKey, SlotMap};

use crate::buffer::{BufferLayout, ImageBuffer, PixelFormat};
use crate::error::{Error, Result};
use crate::geometry::Value;
use crate::image::Image;

/// Holds a number of images, addressed by [`PoolKey`].
#[derive(Default)]
pub struct Pool {
    items: SlotMap<DefaultKey, Image>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey(DefaultKey);

/// A view on an image inside the pool.
pub struct PoolImage<'pool> {
    key: DefaultKey,
    image: &'pool Image,
}

/// A handle on an image inside the pool.
pub struct PoolImageMut<'pool> {
    /// The key of the slot map referring to this entry.
    key: DefaultKey,
    /// The image inside the pool.
    image: &'pool mut Image,
}

pub struct Iter<'pool> {
    inner: slotmap::basic::Iter<'pool, DefaultKey, Image>,
}

pub struct IterMut<'pool> {
    inner: slotmap::basic::IterMut<'pool, DefaultKey, Image>,
}

impl PoolKey {
    /// Create a new pool key that does not name any image.
    pub fn null() -> Self {
        PoolKey(DefaultKey::default())
    }
}

impl Pool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Pool::default()
    }

    /// Gift the pool an image value.
    pub fn insert(&mut self, image: Image) -> PoolImageMut<'_> {
        let key = self.items.insert(image);
        PoolImageMut {
            key,
            image: &mut self.items[key],
        }
    }

    /// Gift the pool a raw buffer.
    pub fn insert_buffer(&mut self, buffer: ImageBuffer) -> PoolImageMut<'_> {
        self.insert(Image::from_buffer(buffer))
    }

    /// Allocate a zeroed image with the given layout.
    pub fn declare(&mut self, layout: BufferLayout) -> PoolImageMut<'_> {
        self.insert(Image::from_buffer(ImageBuffer::with_layout(layout)))
    }

    /// Get a view of an image in the pool.
    pub fn get(&self, PoolKey(key): PoolKey) -> Option<PoolImage<'_>> {
        Some(PoolImage {
            key,
            image: self.items.get(key)?,
        })
    }

    /// Get a mutable handle of an image in the pool.
    pub fn entry(&mut self, PoolKey(key): PoolKey) -> Option<PoolImageMut<'_>> {
        Some(PoolImageMut {
            key,
            image: self.items.get_mut(key)?,
        })
    }

    /// Remove an image, returning it.
    pub fn take(&mut self, PoolKey(key): PoolKey) -> Option<Image> {
        self.items.remove(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over all entries in the pool.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.items.iter(),
        }
    }

    /// Iterate over all entries in the pool.
    pub fn iter_mut(&mut self) -> IterMut<'_> {
        IterMut {
            inner: self.items.iter_mut(),
        }
    }

    /// Build the source binding for a graph run: `source name -> key`.
    ///
    /// Returns an error naming the first missing key.
    pub fn bind_sources<'a>(
        &self,
        bindings: impl IntoIterator<Item = (&'a str, PoolKey)>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut sources = BTreeMap::new();
        for (name, key) in bindings {
            let entry = self.get(key).ok_or_else(|| {
                Error::invalid_argument("sources", format!("no pool image for source `{}`", name))
            })?;
            sources.insert(name.to_owned(), Value::Image(entry.image.clone()));
        }
        Ok(sources)
    }
}

impl PoolImage<'_> {
    pub fn key(&self) -> PoolKey {
        PoolKey(self.key)
    }

    pub fn image(&self) -> &Image {
        self.image
    }

    /// The pixel format, decoding headers but not pixels when compressed.
    pub fn format(&self) -> PixelFormat {
        self.image.format()
    }

    /// View the materialized pixels, if any.
    pub fn as_buffer(&self) -> Option<&ImageBuffer> {
        if self.image.is_materialized() {
            self.image.pixels().ok()
        } else {
            None
        }
    }
}

impl PoolImageMut<'_> {
    /// Get the key associated with the image.
    ///
    /// You can use the key to access this same image again.
    pub fn key(&self) -> PoolKey {
        PoolKey(self.key)
    }

    pub fn image(&self) -> &Image {
        self.image
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&mut self, image: Image) -> Image {
        core::mem::replace(self.image, image)
    }

    /// Swap the value with another image in place.
    pub fn swap(&mut self, image: &mut Image) {
        core::mem::swap(self.image, image);
    }
}

impl<'pool> From<PoolImageMut<'pool>> for PoolImage<'pool> {
    fn from(img: PoolImageMut<'pool>) -> Self {
        PoolImage {
            key: img.key,
            image: img.image,
        }
    }
}

impl<'pool> Iterator for Iter<'pool> {
    type Item = PoolImage<'pool>;
    fn next(&mut self) -> Option<Self::Item> {
        let (key, image) = self.inner.next()?;
        Some(PoolImage { key, image })
    }
}

impl<'pool> Iterator for IterMut<'pool> {
    type Item = PoolImageMut<'pool>;
    fn next(&mut self) -> Option<Self::Item> {
        let (key, image) = self.inner.next()?;
        Some(PoolImageMut { key, image })
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pool({} images)", self.items.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_survive_mutation() {
        let mut pool = Pool::new();
        let layout = BufferLayout::new(2, 2, PixelFormat::GRAY_U8).unwrap();
        let key = pool.declare(layout).key();
        assert_eq!(pool.len(), 1);

        let other = Image::from_buffer(ImageBuffer::with_layout(layout));
        let previous = pool.entry(key).map(|mut entry| entry.replace(other));
        assert!(previous.is_some());
        assert!(pool.get(key).is_some());
        assert!(pool.take(key).is_some());
        assert!(pool.get(key).is_none());
    }

    #[test]
    fn binding_names_missing_sources() {
        let pool = Pool::new();
        let err = pool
            .bind_sources(vec![("source", PoolKey::null())])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}

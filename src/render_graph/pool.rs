//! Render target pool
//!
//! Render targets are recycled between nodes and across frames. Requests are
//! matched by a canonical [`PoolKey`] derived from the resolved descriptor:
//! two requests that would produce identical GPU textures share a key.
//!
//! Textures are never destroyed during normal rendering. They sit in the free
//! lists until [`TexturePool::trim`] drops the ones that went unused for too
//! many frames, or [`TexturePool::clear`] drops everything.

use crate::backend::traits::{BackendResult, Renderer, TextureHandle};
use crate::backend::types::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Canonical allocation key.
///
/// Textures with a non power of two size cannot be mipmapped or repeat
/// wrapped on every target, so for those the key always records
/// `use_mipmap = false` and clamp-to-edge wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub use_mipmap: bool,
}

impl PoolKey {
    pub fn from_desc(desc: &TextureDescriptor) -> Self {
        let key = Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            min_filter: desc.min_filter,
            mag_filter: desc.mag_filter,
            wrap_s: desc.wrap_s,
            wrap_t: desc.wrap_t,
            use_mipmap: desc.has_mipmaps(),
        };
        key.normalized()
    }

    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    fn normalized(mut self) -> Self {
        if !self.is_power_of_two() {
            self.use_mipmap = false;
            self.wrap_s = WrapMode::ClampToEdge;
            self.wrap_t = WrapMode::ClampToEdge;
        }
        self
    }

    /// Descriptor the pool allocates for this key
    pub fn to_desc(&self) -> TextureDescriptor {
        let desc = TextureDescriptor {
            label: Some(self.to_string()),
            width: self.width,
            height: self.height,
            format: self.format,
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            wrap_s: self.wrap_s,
            wrap_t: self.wrap_t,
            mip_levels: 1,
        };
        if self.use_mipmap {
            desc.with_mipmaps()
        } else {
            desc
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}:{:?}:{:?}/{:?}:{:?}/{:?}{}",
            self.width,
            self.height,
            self.format,
            self.min_filter,
            self.mag_filter,
            self.wrap_s,
            self.wrap_t,
            if self.use_mipmap { ":mip" } else { "" }
        )
    }
}

/// A render target checked out of the pool.
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds the value owns
/// the texture until it is put back.
#[derive(Debug, PartialEq, Eq)]
pub struct RenderTexture {
    handle: TextureHandle,
    key: PoolKey,
}

impl RenderTexture {
    pub fn handle(&self) -> TextureHandle {
        self.handle
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }
}

struct FreeTexture {
    texture: RenderTexture,
    idle_frames: u32,
}

/// Pool counters since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocations: usize,
    pub reuses: usize,
    pub destroyed: usize,
}

/// Render target pool keyed by [`PoolKey`]
#[derive(Default)]
pub struct TexturePool {
    free: FxHashMap<PoolKey, Vec<FreeTexture>>,
    outstanding: FxHashSet<TextureHandle>,
    stats: PoolStats,
}

impl TexturePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a texture matching `desc`, reusing a free one when the
    /// canonical keys match.
    pub fn get(
        &mut self,
        renderer: &mut dyn Renderer,
        desc: &TextureDescriptor,
    ) -> BackendResult<RenderTexture> {
        let key = PoolKey::from_desc(desc);

        let texture = match self.free.get_mut(&key).and_then(Vec::pop) {
            Some(free) => {
                self.stats.reuses += 1;
                free.texture
            }
            None => {
                let handle = renderer.create_texture(&key.to_desc())?;
                self.stats.allocations += 1;
                log::debug!("Pool allocated {:?} for {}", handle, key);
                RenderTexture { handle, key }
            }
        };

        self.outstanding.insert(texture.handle);
        Ok(texture)
    }

    /// Return a texture to the free list for its key.
    pub fn put(&mut self, texture: RenderTexture) {
        if !self.outstanding.remove(&texture.handle) {
            log::warn!(
                "Texture {:?} returned to a pool that did not hand it out",
                texture.handle
            );
        }
        self.free.entry(texture.key).or_default().push(FreeTexture {
            texture,
            idle_frames: 0,
        });
    }

    /// Age every free texture by one frame.
    pub fn end_frame(&mut self) {
        for bucket in self.free.values_mut() {
            for free in bucket.iter_mut() {
                free.idle_frames += 1;
            }
        }
    }

    /// Destroy free textures idle for more than `max_idle_frames`.
    pub fn trim(&mut self, renderer: &mut dyn Renderer, max_idle_frames: u32) {
        let mut destroyed = 0;
        for bucket in self.free.values_mut() {
            bucket.retain(|free| {
                if free.idle_frames > max_idle_frames {
                    renderer.destroy_texture(free.texture.handle);
                    destroyed += 1;
                    false
                } else {
                    true
                }
            });
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
        if destroyed > 0 {
            log::debug!("Pool trimmed {} idle textures", destroyed);
        }
        self.stats.destroyed += destroyed;
    }

    /// Destroy every free texture. Outstanding textures are unaffected.
    pub fn clear(&mut self, renderer: &mut dyn Renderer) {
        for (_, bucket) in self.free.drain() {
            for free in bucket {
                renderer.destroy_texture(free.texture.handle);
                self.stats.destroyed += 1;
            }
        }
    }

    /// Free textures available for reuse
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    /// Textures currently checked out
    #[must_use]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        self.free_count() + self.outstanding_count()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    fn rgba(width: u32, height: u32) -> TextureDescriptor {
        TextureDescriptor::new(width, height, TextureFormat::Rgba8Unorm)
    }

    #[test]
    fn test_reuse_after_put() {
        let mut backend = DummyBackend::new(256, 256);
        let mut pool = TexturePool::new();

        let first = pool.get(&mut backend, &rgba(100, 100)).unwrap();
        let handle = first.handle();
        pool.put(first);

        let second = pool.get(&mut backend, &rgba(100, 100)).unwrap();
        assert_eq!(second.handle(), handle);
        assert_eq!(pool.stats().allocations, 1);
        assert_eq!(pool.stats().reuses, 1);
        assert_eq!(backend.live_textures(), 1);
    }

    #[test]
    fn test_distinct_keys_do_not_share() {
        let mut backend = DummyBackend::new(256, 256);
        let mut pool = TexturePool::new();

        let a = pool.get(&mut backend, &rgba(64, 64)).unwrap();
        pool.put(a);
        let b = pool
            .get(
                &mut backend,
                &TextureDescriptor::new(64, 64, TextureFormat::Rgba16Float),
            )
            .unwrap();
        assert_eq!(pool.stats().allocations, 2);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.outstanding_count(), 1);
        pool.put(b);
    }

    #[test]
    fn test_non_power_of_two_normalization() {
        let plain = PoolKey::from_desc(&rgba(100, 100));
        let mut wrapped = rgba(100, 100).with_mipmaps();
        wrapped.wrap_s = WrapMode::Repeat;
        assert_eq!(PoolKey::from_desc(&wrapped), plain);
        assert!(!plain.use_mipmap);
        assert_eq!(plain.to_desc().mip_levels, 1);

        let pot = PoolKey::from_desc(&rgba(128, 128));
        let pot_mip = PoolKey::from_desc(&rgba(128, 128).with_mipmaps());
        assert_ne!(pot, pot_mip);
        assert_eq!(pot_mip.to_desc().mip_levels, 8);
    }

    #[test]
    fn test_trim_destroys_idle_textures() {
        let mut backend = DummyBackend::new(256, 256);
        let mut pool = TexturePool::new();

        let texture = pool.get(&mut backend, &rgba(32, 32)).unwrap();
        pool.put(texture);
        pool.end_frame();
        pool.trim(&mut backend, 1);
        assert_eq!(pool.free_count(), 1);

        pool.end_frame();
        pool.trim(&mut backend, 1);
        assert_eq!(pool.free_count(), 0);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_clear_keeps_outstanding() {
        let mut backend = DummyBackend::new(256, 256);
        let mut pool = TexturePool::new();

        let held = pool.get(&mut backend, &rgba(32, 32)).unwrap();
        let freed = pool.get(&mut backend, &rgba(32, 32)).unwrap();
        pool.put(freed);
        pool.clear(&mut backend);

        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.outstanding_count(), 1);
        assert_eq!(backend.live_textures(), 1);
        pool.put(held);
    }
}

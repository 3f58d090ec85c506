//! # IDs
//! Layers, elements and documents need identities that survive reordering, duplication and
//! undo. This is implemented via the `DabbleID<T>` type, which hands out process-unique IDs
//! namespaced by the type T.
//!
//! Use `DabbleID<YourNamespaceTy>::default()` for a single id, or `DabbleID::many` to reserve a batch.

use std::sync::atomic::{AtomicU64, Ordering};

// Next available id, per namespace. Namespaces are only inserted a handful of times in the whole
// life of the program, so readers vastly outnumber writers here.
static ID_SERVER: parking_lot::RwLock<
    std::collections::BTreeMap<std::any::TypeId, AtomicU64>,
> = parking_lot::const_rwlock(std::collections::BTreeMap::new());

/// ID that is unique within this execution of the program.
/// IDs with different namespaces may share a value but are never comparable.
pub struct DabbleID<T: std::any::Any> {
    id: std::num::NonZeroU64,
    _namespace: std::marker::PhantomData<fn() -> T>,
}
impl<T: std::any::Any> Clone for DabbleID<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for DabbleID<T> {}
impl<T: std::any::Any> PartialEq for DabbleID<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T: std::any::Any> Eq for DabbleID<T> {}
impl<T: std::any::Any> PartialOrd for DabbleID<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: std::any::Any> Ord for DabbleID<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T: std::any::Any> std::hash::Hash for DabbleID<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: std::any::Any> DabbleID<T> {
    /// Raw numeric value of this ID. IDs from differing namespaces may share the same value!
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id.get()
    }
    /// Reserve `count` IDs at once. The order of the returned IDs is unspecified, only uniqueness is.
    ///
    /// Exhausting the namespace (`u64::MAX - 1` ids) is unrecoverable and aborts the process.
    pub fn many(count: usize) -> impl ExactSizeIterator<Item = Self> {
        let count_u64 = count as u64;
        let ty = std::any::TypeId::of::<T>();

        let start = {
            let read = ID_SERVER.upgradable_read();
            if let Some(next) = read.get(&ty) {
                next.fetch_add(count_u64, Ordering::Relaxed)
            } else {
                let mut write = parking_lot::RwLockUpgradableReadGuard::upgrade(read);
                // Zero is the niche, so the namespace starts at one.
                write
                    .entry(ty)
                    .or_insert_with(|| AtomicU64::new(1))
                    .fetch_add(count_u64, Ordering::Relaxed)
            }
        };

        #[allow(clippy::manual_assert)]
        if start.wrapping_add(count_u64) < start || start == 0 {
            #[cfg(not(test))]
            {
                log::error!("{} ID overflow! Aborting!", std::any::type_name::<T>());
                log::logger().flush();
                std::process::abort();
            }
            #[cfg(test)]
            {
                panic!("{} ID overflow! Aborting!", std::any::type_name::<T>())
            }
        }

        (0..count).filter_map(move |idx| {
            std::num::NonZeroU64::new(start + idx as u64).map(|id| DabbleID {
                id,
                _namespace: std::marker::PhantomData,
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
    }
}
impl<T: std::any::Any> Default for DabbleID<T> {
    fn default() -> Self {
        // `many(1)` always yields exactly one id, or aborts.
        Self::many(1)
            .next()
            .unwrap_or_else(|| unreachable!("id server yielded no id"))
    }
}
impl<T: std::any::Any> std::fmt::Display for DabbleID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        // rsplit always yields at least one item.
        let short = name.rsplit("::").next().unwrap_or(name);
        write!(f, "{short}#{}", self.id)
    }
}
impl<T: std::any::Any> std::fmt::Debug for DabbleID<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Stable string identity of a texture. Textures are looked up by this, never by pointer.
///
/// Bundled resources and layer buffers use explicit names, pasted bitmaps use a hash of their
/// encoded bytes so identical pastes share one texture.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TextureId(std::sync::Arc<str>);
impl TextureId {
    pub fn explicit(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().into())
    }
    /// Content-addressed id from the `blake3` hash of `bytes`.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        let hash = blake3::hash(bytes);
        Self(format!("content/{}", hash.to_hex()).into())
    }
    /// Move a caller-chosen id out of the engine's own names, under `user/`.
    /// Ids already under `user/` or `content/` are kept.
    #[must_use]
    pub fn into_user(self) -> Self {
        if self.0.starts_with("user/") || self.0.starts_with("content/") {
            self
        } else {
            Self(format!("user/{}", self.0).into())
        }
    }
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl std::fmt::Display for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
impl std::fmt::Debug for TextureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TextureId({:?})", &*self.0)
    }
}

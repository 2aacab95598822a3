use rustc_hash::FxHashMap;

use crate::device::{BindGroupHandle, BufferHandle, DeviceEpoch, GpuBackend};
use crate::error::BackendError;

use super::pipeline_key::BindGroupLayoutKey;

/// The one bind group of a pipeline layout, addressing the frame uniform
/// buffer through a dynamic offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub handle: BindGroupHandle,
    pub layout: BindGroupLayoutKey,
    pub buffer: BufferHandle,
    pub epoch: DeviceEpoch,
}

/// Holds exactly one live bind group per pipeline layout.
///
/// Creations over a session equal the number of distinct
/// `(layout, epoch)` pairs seen, independent of draw or frame count.
#[derive(Debug, Default)]
pub struct BindGroupCache {
    entries: FxHashMap<BindGroupLayoutKey, BindGroupEntry>,
    creations: u64,
}

impl BindGroupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached entry for `layout`, creating it over `buffer` on a
    /// miss.
    ///
    /// An entry from another epoch or bound to another buffer is never handed
    /// out; it is replaced.
    pub fn get_or_create<B: GpuBackend + ?Sized>(
        &mut self,
        layout: BindGroupLayoutKey,
        buffer: BufferHandle,
        backend: &mut B,
    ) -> Result<BindGroupEntry, BackendError> {
        let epoch = backend.epoch();
        if let Some(entry) = self.entries.get(&layout) {
            if entry.epoch == epoch && entry.buffer == buffer {
                return Ok(*entry);
            }
        }

        let handle = backend.create_bind_group(layout, buffer)?;
        let entry = BindGroupEntry {
            handle,
            layout,
            buffer,
            epoch,
        };
        self.entries.insert(layout, entry);
        self.creations += 1;
        log::debug!(
            "bind group created for {:?} layout ({} bytes) at epoch {}",
            layout.visibility,
            layout.binding_size,
            epoch
        );
        Ok(entry)
    }

    /// Drops every entry. Called on epoch advance or buffer replacement.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bind groups created over the cache's lifetime.
    #[inline]
    pub fn creations(&self) -> u64 {
        self.creations
    }
}

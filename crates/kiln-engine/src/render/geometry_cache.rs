use rustc_hash::FxHashMap;

use crate::device::{DeviceEpoch, DrawCount, GeometryHandle, GeometryUpload, GpuBackend};
use crate::error::BackendError;
use crate::scene::{Geometry, GeometryId};

/// Frames a geometry may go undrawn before its GPU buffers are released.
pub const DEFAULT_GEOMETRY_RETENTION: u64 = 120;

/// Device-resident copy of a [`Geometry`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GpuGeometry {
    pub handle: GeometryHandle,
    pub count: DrawCount,
    pub epoch: DeviceEpoch,
}

#[derive(Debug, Copy, Clone)]
struct Resident {
    gpu: GpuGeometry,
    last_used: u64,
}

/// Uploads each geometry once per device epoch and releases geometry that
/// has not been drawn for `retention` frames.
#[derive(Debug)]
pub struct GeometryCache {
    entries: FxHashMap<GeometryId, Resident>,
    frame: u64,
    retention: u64,
    uploads: u64,
    evictions: u64,
}

impl Default for GeometryCache {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            frame: 0,
            retention: DEFAULT_GEOMETRY_RETENTION,
            uploads: 0,
            evictions: 0,
        }
    }
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_retention(&mut self, frames: u64) {
        self.retention = frames;
    }

    #[inline]
    pub fn retention(&self) -> u64 {
        self.retention
    }

    /// Advances the frame counter used for idle tracking.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
    }

    pub fn get_or_upload<B: GpuBackend + ?Sized>(
        &mut self,
        geometry: &Geometry,
        backend: &mut B,
    ) -> Result<GpuGeometry, BackendError> {
        let epoch = backend.epoch();
        if let Some(entry) = self.entries.get_mut(&geometry.id()) {
            if entry.gpu.epoch == epoch {
                entry.last_used = self.frame;
                return Ok(entry.gpu);
            }
        }

        let handle = backend.upload_geometry(&GeometryUpload {
            label: geometry.label(),
            vertices: geometry.vertex_bytes(),
            indices: geometry.indices(),
        })?;
        let gpu = GpuGeometry {
            handle,
            count: geometry.draw_count(),
            epoch,
        };
        self.entries.insert(
            geometry.id(),
            Resident {
                gpu,
                last_used: self.frame,
            },
        );
        self.uploads += 1;
        Ok(gpu)
    }

    /// Releases every geometry idle for more than `retention` frames.
    /// Returns how many were released.
    pub fn evict_idle<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) -> usize {
        let cutoff = self.frame.saturating_sub(self.retention);
        let idle: Vec<GeometryId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_used < cutoff)
            .map(|(id, _)| *id)
            .collect();

        for id in &idle {
            self.release(*id, backend);
        }
        if !idle.is_empty() {
            log::debug!("released {} idle geometries", idle.len());
        }
        idle.len()
    }

    /// Drops `id` from the cache and frees its GPU buffers. Returns whether
    /// it was resident.
    pub fn release<B: GpuBackend + ?Sized>(&mut self, id: GeometryId, backend: &mut B) -> bool {
        let Some(entry) = self.entries.remove(&id) else {
            return false;
        };
        // A stale or lost handle has nothing left to free.
        if let Err(err) = backend.release_geometry(entry.gpu.handle) {
            log::debug!("geometry release skipped: {err}");
        }
        self.evictions += 1;
        true
    }

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

    #[inline]
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Geometries released by eviction or explicit release.
    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }
}

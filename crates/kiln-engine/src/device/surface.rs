use std::sync::{Arc, RwLock, Weak};

use crate::error::InitializationError;

/// Drawable size of a render target, in physical pixels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
}

impl SurfaceInfo {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Owner-side handle of a render target.
///
/// The embedding application owns this value for as long as the target
/// exists. Dropping it (window closed, canvas detached) invalidates every
/// [`SurfaceWatch`] derived from it.
#[derive(Debug)]
pub struct RenderSurface {
    info: Arc<RwLock<SurfaceInfo>>,
}

impl RenderSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            info: Arc::new(RwLock::new(SurfaceInfo::new(width, height))),
        }
    }

    pub fn info(&self) -> SurfaceInfo {
        match self.info.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Records a new drawable size. Observers see it on their next check.
    pub fn set_size(&self, width: u32, height: u32) {
        let mut guard = match self.info.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = SurfaceInfo::new(width, height);
    }

    /// Returns a non-owning liveness token.
    pub fn watch(&self) -> SurfaceWatch {
        SurfaceWatch {
            info: Arc::downgrade(&self.info),
        }
    }
}

/// Non-owning view of a [`RenderSurface`].
#[derive(Debug, Clone)]
pub struct SurfaceWatch {
    info: Weak<RwLock<SurfaceInfo>>,
}

impl SurfaceWatch {
    pub fn is_alive(&self) -> bool {
        self.info.strong_count() > 0
    }

    /// Current surface size, or `SurfaceDestroyed` once the owner is gone.
    pub fn ensure_alive(&self) -> Result<SurfaceInfo, InitializationError> {
        let info = self
            .info
            .upgrade()
            .ok_or(InitializationError::SurfaceDestroyed)?;
        let size = match info.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_tracks_owner() {
        let surface = RenderSurface::new(640, 480);
        let watch = surface.watch();
        assert_eq!(watch.ensure_alive().unwrap(), SurfaceInfo::new(640, 480));

        surface.set_size(800, 600);
        assert_eq!(watch.ensure_alive().unwrap().width, 800);

        drop(surface);
        assert!(!watch.is_alive());
        assert_eq!(
            watch.ensure_alive(),
            Err(InitializationError::SurfaceDestroyed)
        );
    }

    #[test]
    fn zero_sized_surface_is_empty() {
        assert!(SurfaceInfo::new(0, 10).is_empty());
        assert!(!SurfaceInfo::new(1, 1).is_empty());
    }
}

use std::fmt;

/// Generation counter of the GPU device.
///
/// Advances by one every time the device is lost and re-acquired. Every handle
/// records the epoch it was created in; a handle from an older epoch refers to
/// a destroyed object and is rejected by the backend.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeviceEpoch(u64);

impl DeviceEpoch {
    pub const INITIAL: Self = Self(0);

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DeviceEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub struct $name {
            index: u32,
            epoch: DeviceEpoch,
        }

        impl $name {
            pub const KIND: &'static str = $kind;

            #[inline]
            pub const fn new(index: u32, epoch: DeviceEpoch) -> Self {
                Self { index, epoch }
            }

            #[inline]
            pub const fn index(self) -> u32 {
                self.index
            }

            #[inline]
            pub const fn epoch(self) -> DeviceEpoch {
                self.epoch
            }
        }
    };
}

gpu_handle!(
    /// GPU buffer (the frame uniform buffer).
    BufferHandle,
    "buffer"
);
gpu_handle!(
    /// Bind group exposing a uniform buffer with a dynamic offset.
    BindGroupHandle,
    "bind group"
);
gpu_handle!(
    /// Compiled render pipeline.
    PipelineHandle,
    "pipeline"
);
gpu_handle!(
    /// Uploaded vertex (and optional index) buffers of one geometry.
    GeometryHandle,
    "geometry"
);

/// Initialization parameters for the wgpu backend.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct WgpuInit {
    /// Backends the instance may select from.
    pub backends: wgpu::Backends,

    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter. Useful for CI machines without a GPU.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Format of the color target the frame pass renders into.
    pub color_format: wgpu::TextureFormat,

    /// Depth attachment format. `None` renders without depth testing.
    pub depth_format: Option<wgpu::TextureFormat>,

    pub label: &'static str,
}

impl Default for WgpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            color_format: wgpu::TextureFormat::Rgba8UnormSrgb,
            depth_format: Some(wgpu::TextureFormat::Depth24Plus),
            label: "kiln device",
        }
    }
}

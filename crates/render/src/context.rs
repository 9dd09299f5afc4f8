use std::collections::BTreeSet;

use cubeview_common::{SurfaceSize, Viewport, WideIndexPolicy};

use crate::device::{Capability, DeviceSource, GpuDevice, IndexFormat, OptionalFeature};
use crate::error::PipelineError;

/// Fixed-function state enabled on a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub depth_test: bool,
    pub blending: bool,
}

/// A GPU device bound to one surface, configured for drawing the cube.
///
/// Created once by [`RenderingContext::initialize`] and never recreated.
pub struct RenderingContext<D: GpuDevice> {
    device: D,
    size: SurfaceSize,
    viewport: Viewport,
    capabilities: Capabilities,
    features: BTreeSet<OptionalFeature>,
}

impl<D: GpuDevice> RenderingContext<D> {
    /// Acquires a device for a `width`×`height` surface, sets the full-surface
    /// viewport, enables depth testing and blending, and requests the optional
    /// features. Unsupported features are left disabled.
    pub fn initialize<S>(source: S, width: u32, height: u32) -> Result<Self, PipelineError>
    where
        S: DeviceSource<Device = D>,
    {
        let size = SurfaceSize::new(width, height);
        if !size.is_drawable() {
            return Err(PipelineError::InvalidSurface { width, height });
        }

        let mut device = source
            .acquire(size)
            .map_err(|e| PipelineError::ContextAcquisition {
                reason: e.into_message(),
            })?;

        let viewport = size.full_viewport();
        device.set_viewport(viewport);

        device.enable(Capability::DepthTest);
        device.enable(Capability::Blend);
        let capabilities = Capabilities {
            depth_test: true,
            blending: true,
        };

        let mut features = BTreeSet::new();
        for feature in OptionalFeature::ALL {
            if device.request_feature(feature) {
                features.insert(feature);
            } else {
                tracing::debug!("optional feature unavailable: {feature}");
            }
        }

        tracing::info!(
            "rendering context ready: {}x{}, {} optional feature(s)",
            width,
            height,
            features.len()
        );

        Ok(Self {
            device,
            size,
            viewport,
            capabilities,
            features,
        })
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has_feature(&self, feature: OptionalFeature) -> bool {
        self.features.contains(&feature)
    }

    pub fn features(&self) -> impl Iterator<Item = OptionalFeature> + '_ {
        self.features.iter().copied()
    }

    /// Index width to upload under `policy`.
    pub fn index_format(&self, policy: WideIndexPolicy) -> Result<IndexFormat, PipelineError> {
        if self.has_feature(OptionalFeature::WideIndices) {
            return Ok(IndexFormat::U32);
        }
        match policy {
            WideIndexPolicy::Fallback => {
                tracing::warn!(
                    "{} unavailable, falling back to 16-bit indices",
                    OptionalFeature::WideIndices
                );
                Ok(IndexFormat::U16)
            }
            WideIndexPolicy::Require => Err(PipelineError::MissingFeature {
                feature: OptionalFeature::WideIndices,
            }),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

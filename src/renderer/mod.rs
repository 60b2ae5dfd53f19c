pub mod camera;
pub mod culling;
pub mod lights;
pub mod recorder;
pub mod shadows;
pub mod uniforms;
pub mod vertex;

pub(crate) mod internal;

pub use camera::ShadowCamera;
pub use culling::{
    CascadeRequest, CascadeSlice, CasterBounds, CullingProvider, FrustumCulling, SplitData,
};
pub use lights::{DirectionalLight, ShadowMode, ShadowParams};
pub use recorder::{AtlasRecorder, ShadowCasterDraw};
pub use shadows::{FrameError, FramePhase, MaskMode, ShadowAtlas, ShadowFrame, ShadowGlobals, ShadowRecorder, TileViewport};
pub use uniforms::DirectionalShadowUniform;
pub use vertex::ShadowVertex;

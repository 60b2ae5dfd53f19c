pub mod renderer;
pub mod settings;

pub use renderer::{
    AtlasRecorder, CascadeRequest, CascadeSlice, CasterBounds, CullingProvider, DirectionalLight,
    DirectionalShadowUniform, FrameError, FramePhase, FrustumCulling, MaskMode, ShadowAtlas,
    ShadowCamera, ShadowCasterDraw, ShadowFrame, ShadowGlobals, ShadowMode, ShadowParams,
    ShadowRecorder, ShadowVertex, SplitData, TileViewport,
};
pub use renderer::lights::MAX_SHADOWED_DIRECTIONAL_LIGHTS;
pub use renderer::shadows::MAX_TILES;
pub use settings::{
    CascadeBlend, FilterQuality, ShadowSettings, ShadowmaskQuality, MAX_CASCADES,
};

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}

pub(crate) mod atlas;
pub(crate) mod pipeline;

pub(crate) use atlas::{comparison_sampler, AtlasTexture};
pub(crate) use pipeline::{ShadowPipelineKey, ShadowPipelines};

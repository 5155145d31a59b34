//! Forward rendering: draw-call batching, light dispatch and submission.

pub mod batcher;
pub mod forward;
pub mod lights;

pub use batcher::{DrawBatch, DrawCallBatcher, PreparedDrawCall, PreparedDrawCalls};
pub use forward::{cull_mode, ForwardLayer, ForwardRenderer, LightCluster, RenderStats};
pub use lights::{
    dispatch_global_lights, spot_cookie_matrix, LightDispatcher, LightSlot, SlotFields,
    SortedLights,
};

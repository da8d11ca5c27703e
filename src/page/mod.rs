//! The embedded-page side: ad classification and mitigation, feature
//! overlays and the message protocol with the host.

pub mod actuator;
pub mod classifier;
pub mod context;
mod dom;
pub mod features;
pub mod gate;
pub mod memory;
pub mod messages;
mod runtime;
pub mod signals;

pub use actuator::{AppliedOverrides, MitigationActuator, SkipAction};
pub use classifier::{is_ad, AdClassifier, AdState, Transition};
pub use context::{PageContext, SharedPageContext, VideoContext};
pub use dom::{NodeId, PageDom};
pub use features::{Coordinator, FeatureKind, FeatureSet};
pub use gate::{PlayerEvent, ReclassifyGate, Trigger};
pub use memory::{MediaState, MemoryPage};
pub use messages::{accept, MessageEnvelope, PageMessage, Peer, SegmentsPayload, VideoInfo};
pub use runtime::{video_id_from, PageRuntime};
pub use signals::AdSignalSet;

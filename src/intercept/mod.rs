//! Layered network request blocking on top of a host request pipeline.

mod interceptor;
pub mod layers;
mod pipeline;
mod types;

pub use interceptor::{ContextPhase, NetworkInterceptor, SetupReport};
pub use pipeline::{LocalPipeline, RequestPipeline};
pub use types::{
    Decision, InterceptedRequest, Layer, MatcherRegistration, RegistrationId, RequestHandler,
    UrlFilter,
};

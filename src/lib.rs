// socketapi: real-time APIs over a single multiplexed WebSocket connection.
//
// Clients exchange JSON frames bearing a `type` discriminator and a
// `channel` name; the server dispatches each frame either as a
// request/response action or as a publish/subscribe channel operation.
// Endpoint descriptors are compiled at startup from registered handlers,
// each with a typed parameter schema and optional dependency chain.

pub mod app;
pub mod config;
pub mod endpoint;
pub mod publisher;
pub mod registry;
pub mod schema;

mod ingress;
mod resolve;
mod session;
mod state;
mod subscriptions;

pub use app::{App, SocketApi};
pub use config::Config;
pub use endpoint::{Args, Dependency, Endpoint, EndpointKind, HandlerError, HandlerResult};
pub use publisher::{PublishError, Publisher};
pub use registry::{RegistryError, Router};
pub use resolve::ResolveError;
pub use schema::{ParamSpec, ParamType, SchemaError};
pub use state::{BroadcastError, Ctx};

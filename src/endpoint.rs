//! Endpoint descriptors and the uniform handler shim.
//!
//! User handlers are opaque async callables with one shape: they take the
//! resolved [`Args`] and a [`Ctx`] and return an optional JSON value.  The
//! shim here is the only place the core touches handlers; everything else
//! refers to endpoints by name through the registry.

use crate::schema::{self, CompiledSchema, ParamSpec, SchemaError};
use crate::state::Ctx;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use sa_protocol::Payload;

/// Error raised by a user handler.  The core reports it generically on the
/// wire and logs the detail.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// What a handler produces: `Some(value)` becomes the frame payload,
/// `None` suppresses the frame (actions omit `data`, broadcasts skip the
/// subscriber).
pub type HandlerResult = Result<Option<Value>, HandlerError>;

pub(crate) type BoxHandler = Arc<dyn Fn(Args, Ctx) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

fn shim<F, Fut>(handler: F) -> BoxHandler
where
    F: Fn(Args, Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |args, ctx| -> BoxFuture<'static, HandlerResult> {
        Box::pin(handler(args, ctx))
    })
}

// ---------------------------------------------------------------------------
// Resolved arguments
// ---------------------------------------------------------------------------

/// The validated argument map a handler is invoked with.  Values are in
/// canonical form for their declared type; dependency parameters carry the
/// dependency handler's return value.
#[derive(Debug, Clone)]
pub struct Args(Payload);

impl Args {
    pub(crate) fn new(map: Payload) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value, HandlerError> {
        self.0
            .get(name)
            .ok_or_else(|| HandlerError::new(format!("argument '{}' is missing", name)))
    }

    pub fn require_i64(&self, name: &str) -> Result<i64, HandlerError> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| HandlerError::new(format!("argument '{}' is not an integer", name)))
    }

    pub fn require_f64(&self, name: &str) -> Result<f64, HandlerError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| HandlerError::new(format!("argument '{}' is not a number", name)))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| HandlerError::new(format!("argument '{}' is not a string", name)))
    }

    pub fn require_bool(&self, name: &str) -> Result<bool, HandlerError> {
        self.require(name)?
            .as_bool()
            .ok_or_else(|| HandlerError::new(format!("argument '{}' is not a boolean", name)))
    }

    pub fn into_inner(self) -> Payload {
        self.0
    }
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// A sub-endpoint whose return value is bound to a parameter of its
/// parent.  Not addressable from the wire; its own parameters are nested
/// under the parent parameter's key in the payload.
///
/// Cloning is cheap and shares the handler, so one dependency can be
/// attached to many endpoints.
#[derive(Clone)]
pub struct Dependency {
    name: String,
    params: Arc<Vec<ParamSpec>>,
    handler: BoxHandler,
}

impl Dependency {
    pub fn new(name: impl Into<String>) -> DependencyBuilder {
        DependencyBuilder {
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub(crate) fn handler(&self) -> BoxHandler {
        self.handler.clone()
    }
}

pub struct DependencyBuilder {
    name: String,
    params: Vec<ParamSpec>,
}

impl DependencyBuilder {
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn handler<F, Fut>(self, handler: F) -> Dependency
    where
        F: Fn(Args, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Dependency {
            name: self.name,
            params: Arc::new(self.params),
            handler: shim(handler),
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Action,
    Channel,
}

/// A compiled endpoint descriptor.  Immutable after registration.
pub struct Endpoint {
    pub(crate) name: String,
    pub(crate) kind: EndpointKind,
    pub(crate) schema: Arc<CompiledSchema>,
    pub(crate) default_response: bool,
    pub(crate) handler: BoxHandler,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("schema", &self.schema)
            .field("default_response", &self.default_response)
            .finish()
    }
}

impl Endpoint {
    /// Start building a request/response action endpoint.
    pub fn action(name: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder {
            name: name.into(),
            kind: EndpointKind::Action,
            params: Vec::new(),
            default_response: false,
        }
    }

    /// Start building a publish/subscribe channel endpoint.
    pub fn channel(name: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder {
            name: name.into(),
            kind: EndpointKind::Channel,
            params: Vec::new(),
            default_response: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }
}

pub struct EndpointBuilder {
    name: String,
    kind: EndpointKind,
    params: Vec<ParamSpec>,
    default_response: bool,
}

impl EndpointBuilder {
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Synthesize one invocation for the subscribing session right after a
    /// successful subscribe.  Channels only.
    pub fn default_response(mut self) -> Self {
        self.default_response = true;
        self
    }

    /// Attach the handler and compile the parameter schema.  Compilation
    /// errors (duplicate or misplaced parameters, dependency cycles) are
    /// fatal at startup.
    pub fn handler<F, Fut>(self, handler: F) -> Result<Endpoint, SchemaError>
    where
        F: Fn(Args, Ctx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let allow_bound = self.kind == EndpointKind::Channel;
        let schema = schema::compile(&self.name, allow_bound, &self.params, &mut Vec::new())?;
        Ok(Endpoint {
            name: self.name,
            kind: self.kind,
            schema: Arc::new(schema),
            default_response: self.default_response,
            handler: shim(handler),
        })
    }
}

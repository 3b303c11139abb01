//! Dependency resolver.
//!
//! Turns a JSON payload into a validated argument vector for one endpoint:
//! a depth-first traversal over the compiled schema that validates values,
//! recursively resolves dependency parameters, and invokes their handlers.
//! Re-entrant and stateless; nothing is memoized across invocations.

use crate::endpoint::{Args, Endpoint, HandlerError};
use crate::schema::{CompiledParam, CompiledSchema};
use crate::state::Ctx;
use futures_util::future::BoxFuture;
use sa_protocol::Payload;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("missing required parameter '{param}'")]
    MissingParam { param: String },
    #[error("parameter '{param}' is not a valid {expected}")]
    WrongType {
        param: String,
        expected: &'static str,
    },
    #[error("dependency input for '{param}' must be an object")]
    DependencyInput { param: String },
    /// A user handler (dependency or endpoint) raised.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl ResolveError {
    /// Distinguishes handler faults from validation failures; the wire
    /// reports them differently.
    pub(crate) fn is_fault(&self) -> bool {
        matches!(self, ResolveError::Handler(_))
    }
}

/// Overlay `over` on top of `base` (later keys win).
pub(crate) fn overlay(base: &Payload, over: &Payload) -> Payload {
    let mut merged = base.clone();
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Validate only the required-on-subscribe parameters of `schema` against
/// a subscribe payload, producing the `bound_args` captured on the
/// subscription record.
pub(crate) fn bind_subscription_args(
    schema: &CompiledSchema,
    payload: &Payload,
) -> Result<Payload, ResolveError> {
    let mut bound = Payload::new();
    for param in &schema.params {
        let CompiledParam::Bound { name, ty } = param else {
            continue;
        };
        let value = payload.get(name).ok_or_else(|| ResolveError::MissingParam {
            param: name.clone(),
        })?;
        let coerced = ty.coerce(value).ok_or_else(|| ResolveError::WrongType {
            param: name.clone(),
            expected: ty.name(),
        })?;
        bound.insert(name.clone(), coerced);
    }
    Ok(bound)
}

/// Resolve `payload` against `schema` in declared parameter order.
///
/// Boxed because dependency parameters recurse through here with their
/// nested schemas.
pub(crate) fn resolve<'a>(
    schema: &'a CompiledSchema,
    payload: &'a Payload,
    ctx: &'a Ctx,
) -> BoxFuture<'a, Result<Args, ResolveError>> {
    Box::pin(async move {
        let mut resolved = Payload::new();
        for param in &schema.params {
            match param {
                CompiledParam::Value { name, ty, default } => {
                    let value = match payload.get(name) {
                        Some(value) => {
                            ty.coerce(value).ok_or_else(|| ResolveError::WrongType {
                                param: name.clone(),
                                expected: ty.name(),
                            })?
                        }
                        None => default.clone().ok_or_else(|| ResolveError::MissingParam {
                            param: name.clone(),
                        })?,
                    };
                    resolved.insert(name.clone(), value);
                }
                CompiledParam::Bound { name, ty } => {
                    // At invocation time the effective map already carries
                    // the subscribe-bound value (or a call-time override).
                    let value = payload.get(name).ok_or_else(|| ResolveError::MissingParam {
                        param: name.clone(),
                    })?;
                    let coerced = ty.coerce(value).ok_or_else(|| ResolveError::WrongType {
                        param: name.clone(),
                        expected: ty.name(),
                    })?;
                    resolved.insert(name.clone(), coerced);
                }
                CompiledParam::Dependency {
                    name,
                    schema: dep_schema,
                    handler,
                } => {
                    let nested = match payload.get(name) {
                        None => Payload::new(),
                        Some(Value::Object(map)) => map.clone(),
                        Some(_) => {
                            return Err(ResolveError::DependencyInput { param: name.clone() })
                        }
                    };
                    let dep_args = resolve(dep_schema, &nested, ctx).await?;
                    let value = handler.as_ref()(dep_args, ctx.clone()).await?;
                    resolved.insert(name.clone(), value.unwrap_or(Value::Null));
                }
            }
        }
        Ok(Args::new(resolved))
    })
}

/// Resolve and run one endpoint handler.
pub(crate) async fn resolve_and_invoke(
    endpoint: &Endpoint,
    payload: &Payload,
    ctx: &Ctx,
) -> Result<Option<Value>, ResolveError> {
    let args = resolve(&endpoint.schema, payload, ctx).await?;
    Ok(endpoint.handler.as_ref()(args, ctx.clone()).await?)
}

//! Parameter schema compiler.
//!
//! At registration time an endpoint's declared parameters are compiled, in
//! order, into a [`CompiledSchema`]: a validator that turns a JSON payload
//! into typed argument values.  Dependency parameters compile recursively
//! into nested schemas; cycles and duplicate names fail registration.

use crate::endpoint::{BoxHandler, Dependency};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Declared wire type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    Array,
    Any,
}

impl ParamType {
    pub(crate) fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Any => "any",
        }
    }

    /// Validate `value` against this type, returning the canonical form.
    ///
    /// Coercion follows mainstream schema-library behavior: unambiguous
    /// string<->number both ways, `"true"`/`"false"` for booleans, floats
    /// with a zero fraction for integers.
    pub(crate) fn coerce(self, value: &Value) -> Option<Value> {
        match self {
            ParamType::Any => Some(value.clone()),
            ParamType::String => match value {
                Value::String(s) => Some(Value::String(s.clone())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                _ => None,
            },
            ParamType::Integer => match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Some(Value::from(i))
                    } else {
                        n.as_f64()
                            .filter(|f| f.is_finite() && f.fract() == 0.0)
                            .map(|f| Value::from(f as i64))
                    }
                }
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            ParamType::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(Value::from),
                _ => None,
            },
            ParamType::Boolean => match value {
                Value::Bool(b) => Some(Value::Bool(*b)),
                Value::String(s) => match s.as_str() {
                    "true" => Some(Value::Bool(true)),
                    "false" => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            },
            ParamType::Object => match value {
                Value::Object(_) => Some(value.clone()),
                _ => None,
            },
            ParamType::Array => match value {
                Value::Array(_) => Some(value.clone()),
                _ => None,
            },
        }
    }
}

/// A declared parameter, before compilation.
#[derive(Clone)]
pub struct ParamSpec {
    pub(crate) name: String,
    pub(crate) kind: ParamKind,
}

#[derive(Clone)]
pub(crate) enum ParamKind {
    Value {
        ty: ParamType,
        default: Option<Value>,
    },
    /// Required at subscribe time, replayed into every later broadcast.
    Bound { ty: ParamType },
    Dependency { dep: Dependency },
}

impl ParamSpec {
    /// A plain value parameter, required unless a default is attached.
    pub fn value(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value { ty, default: None },
        }
    }

    /// Attach a default, making a value parameter optional.  Only
    /// meaningful on value parameters.
    pub fn with_default(mut self, value: Value) -> Self {
        if let ParamKind::Value { default, .. } = &mut self.kind {
            *default = Some(value);
        }
        self
    }

    /// A channel parameter that must be supplied at subscribe time and is
    /// merged into every subsequent broadcast to that subscriber.
    pub fn required_on_subscribe(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Bound { ty },
        }
    }

    /// A parameter bound to the result of a nested dependency handler.
    pub fn dependency(name: impl Into<String>, dep: Dependency) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Dependency { dep },
        }
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// Registration-time errors.  All of these are fatal at startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate parameter '{param}' on '{endpoint}'")]
    DuplicateParam { endpoint: String, param: String },
    #[error(
        "required-on-subscribe parameter '{param}' is only valid on channels ('{endpoint}')"
    )]
    BoundParamOutsideChannel { endpoint: String, param: String },
    #[error("cyclic dependency '{dependency}' reached from '{endpoint}'")]
    CyclicDependency {
        endpoint: String,
        dependency: String,
    },
}

pub(crate) struct CompiledSchema {
    pub params: Vec<CompiledParam>,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("params", &self.params)
            .finish()
    }
}

pub(crate) enum CompiledParam {
    Value {
        name: String,
        ty: ParamType,
        default: Option<Value>,
    },
    Bound {
        name: String,
        ty: ParamType,
    },
    Dependency {
        name: String,
        schema: Arc<CompiledSchema>,
        handler: BoxHandler,
    },
}

impl std::fmt::Debug for CompiledParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompiledParam::Value { name, ty, default } => f
                .debug_struct("Value")
                .field("name", name)
                .field("ty", ty)
                .field("default", default)
                .finish(),
            CompiledParam::Bound { name, ty } => f
                .debug_struct("Bound")
                .field("name", name)
                .field("ty", ty)
                .finish(),
            CompiledParam::Dependency { name, schema, .. } => f
                .debug_struct("Dependency")
                .field("name", name)
                .field("schema", schema)
                .finish(),
        }
    }
}

impl CompiledParam {
    pub(crate) fn name(&self) -> &str {
        match self {
            CompiledParam::Value { name, .. }
            | CompiledParam::Bound { name, .. }
            | CompiledParam::Dependency { name, .. } => name,
        }
    }
}

/// Compile the declared parameter list of `endpoint`.
///
/// `allow_bound` is true only for channel endpoints; `path` carries the
/// dependency names currently being compiled so cycles are rejected
/// before any handler can run.
pub(crate) fn compile(
    endpoint: &str,
    allow_bound: bool,
    params: &[ParamSpec],
    path: &mut Vec<String>,
) -> Result<CompiledSchema, SchemaError> {
    let mut compiled: Vec<CompiledParam> = Vec::with_capacity(params.len());
    for spec in params {
        if compiled.iter().any(|p| p.name() == spec.name) {
            return Err(SchemaError::DuplicateParam {
                endpoint: endpoint.to_owned(),
                param: spec.name.clone(),
            });
        }
        let param = match &spec.kind {
            ParamKind::Value { ty, default } => CompiledParam::Value {
                name: spec.name.clone(),
                ty: *ty,
                default: default.clone(),
            },
            ParamKind::Bound { ty } => {
                if !allow_bound {
                    return Err(SchemaError::BoundParamOutsideChannel {
                        endpoint: endpoint.to_owned(),
                        param: spec.name.clone(),
                    });
                }
                CompiledParam::Bound {
                    name: spec.name.clone(),
                    ty: *ty,
                }
            }
            ParamKind::Dependency { dep } => {
                if path.iter().any(|seen| seen == dep.name()) {
                    return Err(SchemaError::CyclicDependency {
                        endpoint: endpoint.to_owned(),
                        dependency: dep.name().to_owned(),
                    });
                }
                path.push(dep.name().to_owned());
                let schema = compile(dep.name(), false, dep.params(), path)?;
                path.pop();
                CompiledParam::Dependency {
                    name: spec.name.clone(),
                    schema: Arc::new(schema),
                    handler: dep.handler(),
                }
            }
        };
        compiled.push(param);
    }
    Ok(CompiledSchema { params: compiled })
}

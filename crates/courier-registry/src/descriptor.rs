//! Operation descriptors.

use courier_core::{ApprovalMode, RiskLevel};
use serde_json::{Value, json};

/// Declared type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// JSON string.
    String,
    /// JSON integer (no fractional part).
    Integer,
    /// JSON boolean.
    Boolean,
    /// Any JSON number.
    Number,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ParamKind {
    /// JSON-Schema type name.
    #[must_use]
    pub fn schema_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` matches this kind.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Number => value.is_number(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One named, typed parameter of an operation.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// Parameter name as it appears in the argument mapping.
    pub name: &'static str,
    /// Declared type.
    pub kind: ParamKind,
    /// Whether the caller must supply it.
    pub required: bool,
}

impl ParamSpec {
    /// A required parameter.
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// An optional parameter.
    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// Session-manager operation a descriptor can bind to instead of a backend
/// call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOp {
    /// Request a verification code for an identity.
    BeginSignIn,
    /// Submit the verification code.
    SubmitCode,
    /// Submit the second-factor secret.
    SubmitSecondFactor,
    /// Sign out and invalidate the session.
    SignOut,
    /// Report the session state.
    SessionStatus,
}

/// Where an operation is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Invoked through the backend adapter under this binding name.
    Backend(&'static str),
    /// Handled by the session manager.
    Auth(AuthOp),
}

/// Static, immutable description of one operation.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    /// Unique operation name.
    pub name: &'static str,
    /// Human-readable description for the operation catalog.
    pub description: &'static str,
    /// Parameter schema.
    pub params: &'static [ParamSpec],
    /// Risk classification.
    pub risk: RiskLevel,
    /// Required approval before the backend is called.
    pub approval: ApprovalMode,
    /// Routing target.
    pub binding: Binding,
}

impl MethodDescriptor {
    /// Whether this operation requires an authenticated session.
    ///
    /// Auth-binding operations are exactly the ones that drive the session
    /// machine and must be callable while unauthenticated.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        matches!(self.binding, Binding::Backend(_))
    }

    /// JSON-Schema object describing the operation's input.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in self.params {
            properties.insert(
                param.name.to_string(),
                json!({"type": param.kind.schema_type()}),
            );
            if param.required {
                required.push(Value::String(param.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

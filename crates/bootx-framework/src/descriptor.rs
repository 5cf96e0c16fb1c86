//! Handler signature introspection.
//!
//! Every registered handler reports a [`Signature`]: the kinds of its
//! parameters and return values. [`describe`] checks that signature against
//! the four supported shapes and produces the immutable [`HandlerDescriptor`]
//! used for the lifetime of the route.
//!
//! | Parameters | Shape |
//! |---|---|
//! | none | [`HandlerShape::Bare`] |
//! | `Context` | [`HandlerShape::Context`] |
//! | payload | [`HandlerShape::Payload`] |
//! | `Context`, payload | [`HandlerShape::ContextPayload`] |
//!
//! Return values are either `error` alone or `value, error`.

use std::any::TypeId;
use std::fmt;

use bootx_core::{BindError, Binder, DecodedPayload, RequestParts};

use crate::error::{RegistrationError, RegistrationResult};
use crate::handler::RequestPayload;

// ============================================================================
// Type tokens
// ============================================================================

/// Identity and display name of a Rust type.
#[derive(Debug, Clone, Copy)]
pub struct TypeToken {
    pub id: TypeId,
    pub name: &'static str,
}

impl TypeToken {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

/// Decodes a raw request into one concrete payload type.
pub type DecodeFn = fn(&dyn Binder, &RequestParts) -> Result<DecodedPayload, BindError>;

/// Builds a payload without reading the request.
pub type EmptyFn = fn() -> Result<DecodedPayload, BindError>;

/// A payload parameter type together with its decoder.
#[derive(Clone, Copy)]
pub struct PayloadType {
    pub token: TypeToken,
    pub decode: DecodeFn,
    /// Used instead of `decode` on routes registered without pre-binding.
    pub empty: EmptyFn,
}

impl PayloadType {
    pub fn of<P: RequestPayload>() -> Self {
        Self {
            token: TypeToken::of::<P>(),
            decode: DecodedPayload::decode::<P>,
            empty: DecodedPayload::empty::<P>,
        }
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PayloadType").field(&self.token.name).finish()
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.token == other.token
    }
}

// ============================================================================
// Signature
// ============================================================================

/// One handler parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    /// The request [`Context`](bootx_core::Context).
    Context,
    /// Any other type, decoded from the request.
    Payload(PayloadType),
}

impl ParamKind {
    fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Context => std::any::type_name::<bootx_core::Context>(),
            ParamKind::Payload(p) => p.token.name,
        }
    }
}

/// One handler return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// A serializable response value.
    Value(TypeToken),
    /// A value satisfying the error contract.
    Error,
}

/// The raw parameter and return shape of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub inputs: Vec<ParamKind>,
    pub outputs: Vec<ReturnKind>,
}

impl Signature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(mut self, kind: ParamKind) -> Self {
        self.inputs.push(kind);
        self
    }

    pub fn output(mut self, kind: ReturnKind) -> Self {
        self.outputs.push(kind);
        self
    }
}

// ============================================================================
// HandlerDescriptor
// ============================================================================

/// Which parameters a handler takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerShape {
    Bare,
    Context,
    Payload,
    ContextPayload,
}

impl HandlerShape {
    pub fn has_context(self) -> bool {
        matches!(self, HandlerShape::Context | HandlerShape::ContextPayload)
    }

    pub fn has_payload(self) -> bool {
        matches!(self, HandlerShape::Payload | HandlerShape::ContextPayload)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerShape::Bare => "()",
            HandlerShape::Context => "(ctx)",
            HandlerShape::Payload => "(payload)",
            HandlerShape::ContextPayload => "(ctx, payload)",
        }
    }
}

impl fmt::Display for HandlerShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable description of a registered handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerDescriptor {
    pub display_name: String,
    pub shape: HandlerShape,
    pub payload: Option<PayloadType>,
    pub response: Option<TypeToken>,
}

impl HandlerDescriptor {
    pub fn has_context(&self) -> bool {
        self.shape.has_context()
    }

    pub fn has_payload(&self) -> bool {
        self.shape.has_payload()
    }

    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }
}

/// Checks a signature against the supported shapes.
pub fn describe(sig: &Signature) -> RegistrationResult<HandlerDescriptor> {
    let name = || sig.name.clone();

    let (shape, payload) = match sig.inputs.as_slice() {
        [] => (HandlerShape::Bare, None),
        [ParamKind::Context] => (HandlerShape::Context, None),
        [ParamKind::Payload(p)] => (HandlerShape::Payload, Some(*p)),
        [ParamKind::Context, ParamKind::Payload(p)] => (HandlerShape::ContextPayload, Some(*p)),
        [ParamKind::Context, ParamKind::Context] => {
            return Err(RegistrationError::DuplicateContext { name: name() });
        }
        [first @ ParamKind::Payload(_), _] => {
            return Err(RegistrationError::FirstInputNotContext {
                name: name(),
                found: first.type_name(),
            });
        }
        inputs => {
            return Err(RegistrationError::TooManyInputs {
                name: name(),
                count: inputs.len(),
            });
        }
    };

    let response = match sig.outputs.as_slice() {
        [ReturnKind::Error] => None,
        [ReturnKind::Value(t), ReturnKind::Error] => Some(*t),
        // An error-typed first value is still a response value.
        [ReturnKind::Error, ReturnKind::Error] => Some(TypeToken::of::<bootx_core::BoxError>()),
        [.., ReturnKind::Value(t)] if (1..=2).contains(&sig.outputs.len()) => {
            return Err(RegistrationError::LastOutputNotError {
                name: name(),
                found: t.name,
            });
        }
        outputs => {
            return Err(RegistrationError::OutputArity {
                name: name(),
                count: outputs.len(),
            });
        }
    };

    Ok(HandlerDescriptor {
        display_name: sig.name.clone(),
        shape,
        payload,
        response,
    })
}

/// A readable handler name derived from its Rust type name.
///
/// Generic arguments and `{{closure}}` segments are dropped, then the last
/// two path segments are kept: `app::handlers::echo<T>` becomes
/// `handlers::echo`.
pub fn display_name(type_name: &str) -> String {
    let mut stripped = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for c in type_name.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let segments: Vec<&str> = stripped
        .split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "{{closure}}")
        .collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("::")
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Req {
        #[allow(dead_code)]
        msg: String,
    }

    impl bootx_core::Validate for Req {}

    fn payload() -> ParamKind {
        ParamKind::Payload(PayloadType::of::<Req>())
    }

    fn value() -> ReturnKind {
        ReturnKind::Value(TypeToken::of::<String>())
    }

    #[test]
    fn test_four_valid_shapes() {
        let cases = [
            (vec![], HandlerShape::Bare),
            (vec![ParamKind::Context], HandlerShape::Context),
            (vec![payload()], HandlerShape::Payload),
            (vec![ParamKind::Context, payload()], HandlerShape::ContextPayload),
        ];
        for (inputs, shape) in cases {
            for outputs in [vec![ReturnKind::Error], vec![value(), ReturnKind::Error]] {
                let with_response = outputs.len() == 2;
                let sig = Signature {
                    name: "h".into(),
                    inputs: inputs.clone(),
                    outputs,
                };
                let desc = describe(&sig).unwrap();
                assert_eq!(desc.shape, shape);
                assert_eq!(desc.has_payload(), shape.has_payload());
                assert_eq!(desc.has_context(), shape.has_context());
                assert_eq!(desc.has_response(), with_response);
            }
        }
    }

    #[test]
    fn test_three_inputs_rejected() {
        let sig = Signature::new("h")
            .input(ParamKind::Context)
            .input(payload())
            .input(payload())
            .output(ReturnKind::Error);
        assert_eq!(
            describe(&sig),
            Err(RegistrationError::TooManyInputs {
                name: "h".into(),
                count: 3
            })
        );
    }

    #[test]
    fn test_first_of_two_must_be_context() {
        let sig = Signature::new("h")
            .input(payload())
            .input(ParamKind::Context)
            .output(ReturnKind::Error);
        let err = describe(&sig).unwrap_err();
        assert!(matches!(err, RegistrationError::FirstInputNotContext { .. }));
        assert!(err.to_string().contains("Req"));
    }

    #[test]
    fn test_output_rules() {
        let three = Signature::new("h")
            .output(value())
            .output(value())
            .output(ReturnKind::Error);
        assert!(matches!(
            describe(&three),
            Err(RegistrationError::OutputArity { count: 3, .. })
        ));

        let none = Signature::new("h");
        assert!(matches!(
            describe(&none),
            Err(RegistrationError::OutputArity { count: 0, .. })
        ));

        let value_last = Signature::new("h").output(ReturnKind::Error).output(value());
        assert!(matches!(
            describe(&value_last),
            Err(RegistrationError::LastOutputNotError { .. })
        ));

        let value_only = Signature::new("h").output(value());
        assert!(matches!(
            describe(&value_only),
            Err(RegistrationError::LastOutputNotError { .. })
        ));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("app::handlers::echo"), "handlers::echo");
        assert_eq!(display_name("app::main::{{closure}}"), "app::main");
        assert_eq!(display_name("app::wrap<app::Req>"), "app::wrap");
        assert_eq!(display_name("echo"), "echo");
    }
}

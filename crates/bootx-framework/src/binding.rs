//! The bind stage: decode and validate a route's payload.

use http::StatusCode;
use tracing::debug;

use bootx_core::{Context, DecodedPayload, Error};

use crate::descriptor::PayloadType;

/// Decodes the declared payload type from the context's request, validates
/// it and stores it in the payload slot.
///
/// Returns `false` after storing a 400 error when either step fails; the
/// caller must not invoke the handler then.
pub fn bind_payload(ctx: &Context, payload: &PayloadType) -> bool {
    let binder = ctx.env().binder.clone();
    let decoded = ctx.with_request(|req| (payload.decode)(&*binder, req));

    let DecodedPayload { value, raw } = match decoded {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(payload = payload.token.name, error = %err, "bind failed");
            ctx.set_status(StatusCode::BAD_REQUEST);
            ctx.set_error(Error::Bind(err));
            return false;
        }
    };

    if let Err(err) = ctx.validator().validate(&*value) {
        debug!(payload = payload.token.name, error = %err, "validation failed");
        ctx.set_status(StatusCode::BAD_REQUEST);
        ctx.set_error(Error::Validation(err));
        return false;
    }

    ctx.set_payload(value, raw);
    true
}

/// Stores a payload built from an empty object, skipping decode and
/// validation. Used by routes registered with pre-binding off.
pub fn empty_payload(ctx: &Context, payload: &PayloadType) -> bool {
    match (payload.empty)() {
        Ok(DecodedPayload { value, raw }) => {
            ctx.set_payload(value, raw);
            true
        }
        Err(err) => {
            ctx.set_error(Error::internal(format!(
                "cannot build empty `{}`: {err}",
                payload.token.name
            )));
            false
        }
    }
}

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};

/// Identity of the authenticated caller, placed in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: String,
}

/// Header set by the authenticating gateway in front of this service.
pub const OWNER_HEADER: &str = "x-user-id";

/// Lifts the gateway-supplied user id into an [`Owner`] extension.
/// Requests that reach us without one are rejected.
pub async fn owner_middleware(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let owner_id = req
        .headers()
        .get(OWNER_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string());

    match owner_id {
        Some(id) => {
            req.extensions_mut().insert(Owner { id });
            Ok(next.run(req).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

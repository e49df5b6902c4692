use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::{validate_jwt, Claims};
use crate::error::ApiError;

/// Acting administrator for lifecycle operations, taken from the token's `user` claim
#[derive(Clone, Debug)]
pub struct AdminActor(pub String);

/// Verifies a bearer token when one is present and inserts its [`Claims`].
///
/// Requests without an Authorization header pass through unauthenticated;
/// a header that is present but invalid is rejected with 401.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_jwt_from_headers(&headers).map_err(ApiError::unauthorized)? else {
        return Ok(next.run(request).await);
    };

    let claims = validate_jwt(&token, &state.jwt_secret).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Admin routes: requires verified claims with root access
pub async fn require_root_middleware(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    if !claims.is_root() {
        tracing::warn!(user = %claims.user, "Non-root token used on admin route");
        return Err(ApiError::forbidden("Root access required"));
    }

    let actor = AdminActor(claims.user.clone());
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

/// Bearer token from the Authorization header, `None` when the header is absent
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, String> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if token.trim().is_empty() => Err("Empty JWT token".to_string()),
        Some(token) => Ok(Some(token.trim().to_string())),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_tokens() {
        assert_eq!(extract_jwt_from_headers(&HeaderMap::new()), Ok(None));
        assert_eq!(extract_jwt_from_headers(&headers("Bearer abc")), Ok(Some("abc".to_string())));
        assert!(extract_jwt_from_headers(&headers("Bearer  ")).is_err());
        assert!(extract_jwt_from_headers(&headers("Basic abc")).is_err());
    }
}

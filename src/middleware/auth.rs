use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{Error, Result};
use crate::services::identity_service::{authorize, Caller};
use crate::utils::token::decode_access_token;
use crate::AppState;

pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Caller> {
    let token = bearer_token(headers)?;
    let claims = decode_access_token(token, &state.jwt_secret)?;
    let identity = state.identity.resolve(claims.user_id()?).await?;
    authorize(identity)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Err(Error::Unauthorized("missing_authorization".to_string()));
    };
    let Ok(raw) = value.to_str() else {
        return Err(Error::Unauthorized("bad_authorization".to_string()));
    };
    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::Unauthorized("unsupported_scheme".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(Error::Unauthorized(m)) if m == "missing_authorization"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(Error::Unauthorized(m)) if m == "unsupported_scheme"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }
}

//! Request extractors: request origin, session authentication and the public base URL.

use crate::error::ApiError;
use crate::AppState;
use api_shared::auth::session_token_from_cookie_header;
use axum::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::{COOKIE, HOST, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use chs_core::{AccountService, RecordError, RequestContext, RequestOrigin};
use std::net::SocketAddr;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client address and user agent. The first `X-Forwarded-For` hop wins over the socket peer.
pub fn request_origin(parts: &Parts) -> RequestOrigin {
    let forwarded = header_str(&parts.headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestOrigin {
        ip_address: forwarded.or(peer),
        user_agent: header_str(&parts.headers, USER_AGENT.as_str()).map(str::to_string),
    }
}

/// Origin of an unauthenticated request.
pub struct Origin(pub RequestOrigin);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Origin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Origin(request_origin(parts)))
    }
}

/// A request carrying a valid session for an active account.
///
/// Rejects with 401 when the cookie is missing, forged, expired, or names an account that no
/// longer exists or has been deactivated.
pub struct Session(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let origin = request_origin(parts);
        let token = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(session_token_from_cookie_header)
            .ok_or(RecordError::Unauthenticated)?;

        let claims = state.sessions.verify(token, Utc::now()).map_err(|e| {
            tracing::debug!("rejected session: {}", e);
            RecordError::Unauthenticated
        })?;
        let actor = AccountService::new(state.cfg.clone()).resolve_session(&claims.sub)?;
        Ok(Session(RequestContext::for_actor(actor, origin)))
    }
}

/// Public base URL used to build gateway redirect and webhook URLs.
///
/// The configured override wins; otherwise it is derived from `X-Forwarded-Proto` and `Host`.
pub struct PublicBaseUrl(pub String);

#[async_trait]
impl FromRequestParts<AppState> for PublicBaseUrl {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(url) = state.public_base_url.as_deref() {
            return Ok(PublicBaseUrl(url.trim_end_matches('/').to_string()));
        }
        let host = header_str(&parts.headers, HOST.as_str()).unwrap_or("localhost");
        let scheme = header_str(&parts.headers, "x-forwarded-proto").unwrap_or("http");
        Ok(PublicBaseUrl(format!("{scheme}://{host}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn forwarded_address_wins_over_peer() {
        let mut p = parts(
            Request::builder()
                .header("x-forwarded-for", "41.90.1.2, 10.0.0.1")
                .header("user-agent", "curl/8"),
        );
        p.extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));

        let origin = request_origin(&p);
        assert_eq!(origin.ip_address.as_deref(), Some("41.90.1.2"));
        assert_eq!(origin.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn peer_address_is_fallback() {
        let mut p = parts(Request::builder());
        p.extensions
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000))));
        let origin = request_origin(&p);
        assert_eq!(origin.ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(origin.user_agent, None);
    }
}

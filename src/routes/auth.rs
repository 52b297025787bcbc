//! Caller identification and the guest-claim endpoint.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, FromRef, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use crate::fast_gate::ClientIp;
use crate::identity::{Identity, is_well_formed_token};
use crate::services::session::{self, SessionUser};
use crate::services::transfer::{self, TransferResult};
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session_token";
pub const GUEST_COOKIE: &str = "guest_session";
const GUEST_COOKIE_DAYS: i64 = 30;

/// `guest_session` cookie carrying a freshly minted token.
#[must_use]
pub fn guest_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((GUEST_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::days(GUEST_COOKIE_DAYS))
        .build()
}

fn clear_guest_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((GUEST_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

fn session_token(jar: &CookieJar) -> Option<&str> {
    jar.get(SESSION_COOKIE).map(Cookie::value).filter(|t| !t.is_empty())
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: SessionUser,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar).ok_or(StatusCode::UNAUTHORIZED)?;

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "session lookup failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { user })
    }
}

/// Whoever is making the request: an account holder or a guest, plus the
/// client IP for the fast gate. Never rejects for a missing or malformed
/// guest cookie; a new guest token is minted instead.
pub struct Caller {
    pub identity: Identity,
    pub ip: ClientIp,
    /// Set when a guest token was minted for this request and must be sent
    /// back as a cookie.
    pub minted_guest_token: Option<String>,
}

impl Caller {
    /// Cookie jar carrying the minted guest cookie, if any.
    #[must_use]
    pub fn cookie_jar(&self, secure: bool) -> CookieJar {
        let jar = CookieJar::new();
        match &self.minted_guest_token {
            Some(token) => jar.add(guest_cookie(token.clone(), secure)),
            None => jar,
        }
    }
}

impl<S> axum::extract::FromRequestParts<S> for Caller
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0);
        let ip = ClientIp::from_request(&parts.headers, peer);
        let jar = CookieJar::from_headers(&parts.headers);

        if let Some(token) = session_token(&jar) {
            match session::validate_session(&app_state.pool, token).await {
                Ok(Some(user)) => {
                    return Ok(Self {
                        identity: Identity::Authenticated { user_id: user.id, plan: user.plan },
                        ip,
                        minted_guest_token: None,
                    });
                }
                // Expired or unknown session: continue as a guest.
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "session lookup failed");
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        let guest = app_state.resolver.resolve_guest(jar.get(GUEST_COOKIE).map(Cookie::value));
        Ok(Self {
            identity: Identity::Guest { session_hash: guest.session_hash },
            ip,
            minted_guest_token: guest.minted_token,
        })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `POST /api/auth/claim-guest`: move the guest cookie's staged history and
/// usage onto the signed-in account, then drop the cookie.
///
/// The result is advisory; transfer failures are logged and reported as zero
/// counts, never as an error status.
pub async fn claim_guest(State(state): State<AppState>, auth: AuthUser, jar: CookieJar) -> Response {
    let Some(token) = jar.get(GUEST_COOKIE).map(Cookie::value).filter(|t| is_well_formed_token(t)) else {
        return Json(TransferResult::default()).into_response();
    };

    let session_hash = state.resolver.hash_token(token);
    let result = transfer::transfer(&state.pool, &session_hash, auth.user.id, state.guest_retention_days).await;

    let jar = jar.add(clear_guest_cookie(state.cookie_secure));
    (jar, Json(result)).into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;

//! Identity extraction: every request is read for
//! `X-User-Id` / `X-User-Admin` headers and turned into a
//! [`RequestIdentity`](crate::model::RequestIdentity). Neither header is
//! required; their absence resolves to the anonymous, non-admin identity
//! rather than rejecting the request, since `/query` and `/conversations*`
//! must stay usable without an identity provider attached.

use crate::model::RequestIdentity;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ADMIN_HEADER: &str = "x-user-admin";

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let subject = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.is_empty())
            .map_or_else(|| Self::anonymous().subject, ToString::to_string);

        let is_admin = parts
            .headers
            .get(USER_ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self { subject, is_admin })
    }
}

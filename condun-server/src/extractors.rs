use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use condun_api::{AuthToken, UserId, Uuid};

use crate::{db, Error};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub admin_token: Option<AuthToken>,
}

/// One pooled connection, held for the duration of a request
pub struct PgConn(sqlx::pool::PoolConnection<sqlx::Postgres>);

#[async_trait]
impl<S> FromRequestParts<S> for PgConn
where
    S: Send + Sync,
    sqlx::PgPool: FromRef<S>,
{
    type Rejection = Error;

    async fn from_request_parts(_req: &mut Parts, state: &S) -> Result<PgConn, Error> {
        let pool = sqlx::PgPool::from_ref(state);
        let conn = pool.acquire().await.context("acquiring db connection")?;
        Ok(PgConn(conn))
    }
}

impl Deref for PgConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &sqlx::PgConnection {
        &self.0
    }
}

impl DerefMut for PgConn {
    fn deref_mut(&mut self) -> &mut sqlx::PgConnection {
        &mut self.0
    }
}

/// A well-formed bearer token, not yet checked against the sessions
pub struct PreAuth(pub AuthToken);

fn bearer_token(req: &Parts) -> Option<AuthToken> {
    let header = req.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.contains(' ') {
        return None;
    }
    Uuid::try_from(token).ok().map(AuthToken)
}

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut Parts, _state: &S) -> Result<PreAuth, Error> {
        bearer_token(req)
            .map(PreAuth)
            .ok_or_else(Error::unauthorized)
    }
}

/// The user owning the request's session
pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut Parts, state: &AppState) -> Result<Auth, Error> {
        let PreAuth(token) = PreAuth::from_request_parts(req, state).await?;
        let mut conn = PgConn::from_request_parts(req, state).await?;
        let user = db::recover_session(&mut conn, token).await?;
        Ok(Auth(user))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut Parts, state: &AppState) -> Result<AdminAuth, Error> {
        let PreAuth(token) = PreAuth::from_request_parts(req, state).await?;
        match state.admin_token {
            Some(admin) if admin == token => Ok(AdminAuth),
            _ => Err(Error::permission_denied()),
        }
    }
}

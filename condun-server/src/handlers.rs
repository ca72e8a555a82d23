use anyhow::Context;
use axum::{extract::Path, Json};
use condun_api::{
    Action, AuthToken, Category, Comment, Effect, NewSession, NewUser, Post, PostId, PostSearch,
    User, UserId, Uuid,
};
use sqlx::Connection;

use crate::{db, extractors::*, Error};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data).await
}

pub async fn admin_create_category(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<Category>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_category(&mut *conn, data).await
}

pub async fn auth(
    mut conn: PgConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    // fuzzers log in without paying for the proof of work
    let pow_skipped = cfg!(test) && data.pow.is_empty();
    if !pow_skipped && !data.has_valid_pow() {
        return Err(Error::invalid_pow());
    }
    Ok(Json(
        db::login_user(&mut *conn, &data)
            .await
            .context("logging user in")?
            .ok_or_else(Error::permission_denied)?,
    ))
}

pub async fn unauth(user: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout_user(&mut *conn, &user.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::unauthorized()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn fetch_users(mut conn: PgConn) -> Result<Json<Vec<User>>, Error> {
    Ok(Json(
        db::fetch_users(&mut *conn)
            .await
            .context("fetching user list")?,
    ))
}

pub async fn fetch_categories(mut conn: PgConn) -> Result<Json<Vec<Category>>, Error> {
    Ok(Json(
        db::fetch_categories(&mut *conn)
            .await
            .context("fetching category list")?,
    ))
}

pub async fn search_posts(
    mut conn: PgConn,
    Json(s): Json<PostSearch>,
) -> Result<Json<Vec<Post>>, Error> {
    s.validate()?;
    Ok(Json(
        db::search_posts(&mut *conn, &s)
            .await
            .with_context(|| format!("searching posts with {s:?}"))?,
    ))
}

pub async fn fetch_post(mut conn: PgConn, Path(post): Path<Uuid>) -> Result<Json<Post>, Error> {
    Ok(Json(db::fetch_post(&mut *conn, PostId(post)).await?))
}

pub async fn fetch_comments(
    mut conn: PgConn,
    Path(post): Path<Uuid>,
) -> Result<Json<Vec<Comment>>, Error> {
    Ok(Json(db::fetch_comments(&mut *conn, PostId(post)).await?))
}

pub async fn view_post(mut conn: PgConn, Path(post): Path<Uuid>) -> Result<Json<Effect>, Error> {
    Ok(Json(db::view_post(&mut *conn, PostId(post)).await?))
}

pub async fn submit_action(
    Auth(user): Auth,
    mut conn: PgConn,
    Json(a): Json<Action>,
) -> Result<Json<Effect>, Error> {
    a.validate()?;
    let mut t = conn.begin().await.context("starting transaction")?;
    let mut db = db::PgDb {
        conn: &mut *t,
        user,
    };
    a.authorize(&mut db)
        .await
        .with_context(|| format!("checking {user:?} may run {a:?}"))??;
    tracing::debug!(?user, action = ?a, "submitting action");
    let effect = db::execute(&mut db, a, db::now()?).await?;
    t.commit().await.context("committing transaction")?;
    Ok(Json(effect))
}

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use condun_api::{
    Action, AuthToken, Avatar, Category, CategoryId, Comment, CommentId, CommentInfo, Db,
    DonationLink, Effect, ImageId, LikeLedger, NewComment, NewPost, NewSession, NewUser, Post,
    PostId, PostSearch, PostSegment, PostSegmentItem, SegmentId, SegmentItemId, Time, User,
    UserId, Uuid, Vote, VoteLedger,
};
use futures::TryStreamExt;
use sqlx::Row;

use crate::{
    query::{self, Bind},
    Error,
};

/// The current time, at the precision postgres stores
pub fn now() -> anyhow::Result<Time> {
    use chrono::DurationRound;
    Utc::now()
        .duration_trunc(chrono::Duration::microseconds(1))
        .context("truncating current time")
}

pub async fn create_user(conn: &mut sqlx::PgConnection, u: NewUser) -> Result<(), Error> {
    let existing = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM users WHERE id = $1 OR name = $2",
    )
    .bind(u.id.0)
    .bind(&u.name)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("checking whether user {:?} already exists", u.id))?;
    match existing {
        Some((id, _)) if id == u.id.0 => return Err(Error::uuid_already_used(id)),
        Some((_, name)) => return Err(Error::name_already_used(name)),
        None => (),
    }
    sqlx::query("INSERT INTO users (id, name, password_hash) VALUES ($1, $2, $3)")
        .bind(u.id.0)
        .bind(&u.name)
        .bind(&u.initial_password_hash)
        .execute(conn)
        .await
        .with_context(|| format!("inserting user {:?}", u.id))?;
    Ok(())
}

pub async fn create_category(conn: &mut sqlx::PgConnection, c: Category) -> Result<(), Error> {
    let existing = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, name FROM categories WHERE id = $1 OR name = $2",
    )
    .bind(c.id.0)
    .bind(&c.name)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("checking whether category {:?} already exists", c.id))?;
    match existing {
        Some((id, _)) if id == c.id.0 => return Err(Error::uuid_already_used(id)),
        Some((_, name)) => return Err(Error::name_already_used(name)),
        None => (),
    }
    sqlx::query("INSERT INTO categories (id, name) VALUES ($1, $2)")
        .bind(c.id.0)
        .bind(&c.name)
        .execute(conn)
        .await
        .with_context(|| format!("inserting category {:?}", c.id))?;
    Ok(())
}

fn password_matches(password: &str, hash: &str) -> bool {
    // tests don't actually use bcrypt
    #[cfg(test)]
    if password == hash {
        return true;
    }
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Returns `None` if the user does not exist or the password is wrong
pub async fn login_user(
    conn: &mut sqlx::PgConnection,
    s: &NewSession,
) -> anyhow::Result<Option<AuthToken>> {
    let user = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, password_hash FROM users WHERE name = $1",
    )
    .bind(&s.user)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("fetching password hash of {:?}", s.user))?;
    let user = match user {
        Some((id, hash)) if password_matches(&s.password, &hash) => id,
        _ => return Ok(None),
    };
    let token = AuthToken(Uuid::new_v4());
    let now = now()?;
    sqlx::query(
        "
            INSERT INTO sessions (id, user_id, device, login_time, last_active)
            VALUES ($1, $2, $3, $4, $4)
        ",
    )
    .bind(token.0)
    .bind(user)
    .bind(&s.device)
    .bind(now)
    .execute(conn)
    .await
    .context("inserting new session")?;
    Ok(Some(token))
}

/// Returns whether a session was actually removed
pub async fn logout_user(
    conn: &mut sqlx::PgConnection,
    token: &AuthToken,
) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(conn)
        .await
        .context("deleting session")?;
    anyhow::ensure!(
        res.rows_affected() <= 1,
        "removed {} sessions for one token",
        res.rows_affected()
    );
    Ok(res.rows_affected() == 1)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> Result<UserId, Error> {
    let user = sqlx::query_as::<_, (Uuid,)>(
        "UPDATE sessions SET last_active = $2 WHERE id = $1 RETURNING user_id",
    )
    .bind(token.0)
    .bind(now()?)
    .fetch_optional(conn)
    .await
    .context("recovering session")?;
    match user {
        Some((u,)) => Ok(UserId(u)),
        None => Err(Error::unauthorized()),
    }
}

pub async fn fetch_users(conn: &mut sqlx::PgConnection) -> anyhow::Result<Vec<User>> {
    let mut links = HashMap::<UserId, Vec<DonationLink>>::new();
    let mut links_query = sqlx::query(
        "SELECT user_id, kind, address FROM donation_links ORDER BY user_id, position",
    )
    .fetch(&mut *conn);
    while let Some(l) = links_query
        .try_next()
        .await
        .context("querying donation_links table")?
    {
        links
            .entry(UserId(
                l.try_get("user_id").context("retrieving the user_id field")?,
            ))
            .or_default()
            .push(DonationLink {
                kind: l.try_get("kind").context("retrieving the kind field")?,
                address: l.try_get("address").context("retrieving the address field")?,
            });
    }
    drop(links_query);

    sqlx::query_as::<_, (Uuid, String, Option<String>, Option<String>)>(
        "SELECT id, name, avatar_image_id, avatar_blur_data_url FROM users ORDER BY id",
    )
    .fetch(conn)
    .map_ok(|(id, name, image_id, blur_data_url)| User {
        id: UserId(id),
        name,
        avatar: image_id.zip(blur_data_url).map(|(i, blur_data_url)| Avatar {
            image_id: ImageId(i),
            blur_data_url,
        }),
        donation_links: links.remove(&UserId(id)).unwrap_or_default(),
    })
    .try_collect()
    .await
    .context("querying users table")
}

pub async fn fetch_categories(conn: &mut sqlx::PgConnection) -> anyhow::Result<Vec<Category>> {
    sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM categories ORDER BY id")
        .fetch(conn)
        .map_ok(|(id, name)| Category {
            id: CategoryId(id),
            name,
        })
        .try_collect()
        .await
        .context("querying categories table")
}

pub async fn search_posts(
    conn: &mut sqlx::PgConnection,
    s: &PostSearch,
) -> anyhow::Result<Vec<Post>> {
    let sql = query::to_postgres(&s.filter, 1);
    let limit = match s.limit {
        Some(l) => format!("LIMIT {l}"),
        None => String::new(),
    };
    let query = format!(
        "
            SELECT p.id
                FROM posts p
            LEFT JOIN v_posts_text vpx
                ON vpx.post_id = p.id
            WHERE {}
            ORDER BY {}
            {limit}
        ",
        sql.where_clause,
        query::order_by(s.order),
    );
    let mut q = sqlx::query_as::<_, (Uuid,)>(&query);
    for b in sql.binds {
        q = match b {
            Bind::Uuid(u) => q.bind(u),
            Bind::String(s) => q.bind(s),
        };
    }
    let ids = q
        .fetch(&mut *conn)
        .map_ok(|(id,)| PostId(id))
        .try_collect::<Vec<PostId>>()
        .await
        .with_context(|| format!("running post search {:?}", s))?;
    fetch_posts(conn, &ids).await
}

/// Returns the posts in the order of `ids`, skipping those that do not exist
pub async fn fetch_posts(
    conn: &mut sqlx::PgConnection,
    ids: &[PostId],
) -> anyhow::Result<Vec<Post>> {
    let raw_ids = ids.iter().map(|p| p.0).collect::<Vec<Uuid>>();

    let mut posts = HashMap::new();
    let mut posts_query = sqlx::query(
        "
            SELECT id, author_id, category_id, title, description, view_count, created_at, updated_at
                FROM posts
            WHERE id = ANY($1)
        ",
    )
    .bind(&raw_ids)
    .fetch(&mut *conn);
    while let Some(p) = posts_query
        .try_next()
        .await
        .context("querying posts table")?
    {
        let id = PostId(p.try_get("id").context("retrieving the id field")?);
        let view_count = p
            .try_get::<i64, _>("view_count")
            .context("retrieving the view_count field")?;
        posts.insert(
            id,
            Post {
                id,
                author_id: UserId(p.try_get("author_id").context("retrieving the author_id field")?),
                title: p.try_get("title").context("retrieving the title field")?,
                description: p
                    .try_get("description")
                    .context("retrieving the description field")?,
                category_id: CategoryId(
                    p.try_get("category_id")
                        .context("retrieving the category_id field")?,
                ),
                tags: Default::default(),
                segments: Vec::new(),
                liked_by: LikeLedger::default(),
                view_count: u64::try_from(view_count)
                    .with_context(|| format!("post {id:?} has negative view count"))?,
                created_at: p
                    .try_get("created_at")
                    .context("retrieving the created_at field")?,
                updated_at: p
                    .try_get("updated_at")
                    .context("retrieving the updated_at field")?,
            },
        );
    }
    drop(posts_query);

    let mut tags = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT post_id, tag FROM post_tags WHERE post_id = ANY($1)",
    )
    .bind(&raw_ids)
    .fetch(&mut *conn);
    while let Some((post, tag)) = tags.try_next().await.context("querying post_tags table")? {
        if let Some(p) = posts.get_mut(&PostId(post)) {
            p.tags.insert(tag);
        }
    }
    drop(tags);

    let mut likes = sqlx::query_as::<_, (Uuid, Uuid)>(
        "SELECT post_id, user_id FROM post_likes WHERE post_id = ANY($1)",
    )
    .bind(&raw_ids)
    .fetch(&mut *conn);
    while let Some((post, user)) = likes.try_next().await.context("querying post_likes table")? {
        if let Some(p) = posts.get_mut(&PostId(post)) {
            p.toggle_like(UserId(user));
        }
    }
    drop(likes);

    let mut segments = sqlx::query_as::<_, (Uuid, Uuid, String, Option<String>, Option<String>)>(
        "
            SELECT id, post_id, title, subtitle, image_id
                FROM post_segments
            WHERE post_id = ANY($1)
            ORDER BY post_id, position
        ",
    )
    .bind(&raw_ids)
    .fetch(&mut *conn);
    while let Some((id, post, title, subtitle, image_id)) = segments
        .try_next()
        .await
        .context("querying post_segments table")?
    {
        if let Some(p) = posts.get_mut(&PostId(post)) {
            p.segments.push(PostSegment {
                id: SegmentId(id),
                title,
                subtitle,
                image_id: image_id.map(ImageId),
                items: Vec::new(),
            });
        }
    }
    drop(segments);

    let mut items = sqlx::query_as::<_, (Uuid, Uuid, Uuid, String, String)>(
        "
            SELECT i.id, i.segment_id, s.post_id, i.title, i.description
                FROM post_segment_items i
            INNER JOIN post_segments s
                ON s.id = i.segment_id
            WHERE s.post_id = ANY($1)
            ORDER BY i.segment_id, i.position
        ",
    )
    .bind(&raw_ids)
    .fetch(&mut *conn);
    while let Some((id, segment, post, title, description)) = items
        .try_next()
        .await
        .context("querying post_segment_items table")?
    {
        if let Some(s) = posts
            .get_mut(&PostId(post))
            .and_then(|p| p.segment_mut(SegmentId(segment)))
        {
            s.items.push(PostSegmentItem {
                id: SegmentItemId(id),
                title,
                description,
            });
        }
    }
    drop(items);

    Ok(ids.iter().filter_map(|id| posts.remove(id)).collect())
}

pub async fn fetch_post(conn: &mut sqlx::PgConnection, post: PostId) -> Result<Post, Error> {
    fetch_posts(conn, &[post])
        .await
        .with_context(|| format!("fetching post {post:?}"))?
        .pop()
        .ok_or_else(|| Error::not_found(post.0))
}

async fn post_exists(conn: &mut sqlx::PgConnection, post: PostId) -> anyhow::Result<bool> {
    Ok(sqlx::query("SELECT 1 FROM posts WHERE id = $1")
        .bind(post.0)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("checking whether post {post:?} exists"))?
        .is_some())
}

/// In creation order, with the text of deleted comments removed
pub async fn fetch_comments(
    conn: &mut sqlx::PgConnection,
    post: PostId,
) -> Result<Vec<Comment>, Error> {
    if !post_exists(&mut *conn, post).await? {
        return Err(Error::not_found(post.0));
    }

    let mut votes = HashMap::<CommentId, VoteLedger>::new();
    let mut votes_query = sqlx::query_as::<_, (Uuid, Uuid, bool)>(
        "
            SELECT cv.comment_id, cv.user_id, cv.is_upvote
                FROM comment_votes cv
            INNER JOIN comments c
                ON c.id = cv.comment_id
            WHERE c.post_id = $1
        ",
    )
    .bind(post.0)
    .fetch(&mut *conn);
    while let Some((comment, user, is_upvote)) = votes_query
        .try_next()
        .await
        .context("querying comment_votes table")?
    {
        votes
            .entry(CommentId(comment))
            .or_default()
            .set(UserId(user), Some(vote_from_db(is_upvote)));
    }
    drop(votes_query);

    Ok(sqlx::query_as::<_, (Uuid, Option<Uuid>, Uuid, String, bool, Time)>(
        "
            SELECT id, parent_id, author_id, text, is_deleted, created_at
                FROM comments
            WHERE post_id = $1
            ORDER BY created_at, id
        ",
    )
    .bind(post.0)
    .fetch(conn)
    .map_ok(|(id, parent_id, author_id, text, is_deleted, created_at)| {
        let id = CommentId(id);
        Comment {
            id,
            post_id: post,
            parent_id: parent_id.map(CommentId),
            author_id: UserId(author_id),
            text,
            is_deleted,
            created_at,
            votes: votes.remove(&id).unwrap_or_default(),
        }
        .redacted()
    })
    .try_collect()
    .await
    .with_context(|| format!("querying comments of post {post:?}"))?)
}

pub async fn view_post(conn: &mut sqlx::PgConnection, post: PostId) -> Result<Effect, Error> {
    let count = sqlx::query_as::<_, (i64,)>(
        "UPDATE posts SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
    )
    .bind(post.0)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("recording a view of post {post:?}"))?;
    match count {
        Some((c,)) => Ok(Effect::PostViewed {
            post_id: post,
            view_count: u64::try_from(c)
                .with_context(|| format!("post {post:?} has negative view count"))?,
        }),
        None => Err(Error::not_found(post.0)),
    }
}

fn vote_from_db(is_upvote: bool) -> Vote {
    match is_upvote {
        true => Vote::Up,
        false => Vote::Down,
    }
}

/// The `Db` of one logged-in user, over a connection that is usually a transaction
pub struct PgDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
    pub user: UserId,
}

#[async_trait]
impl Db for PgDb<'_> {
    fn current_user(&self) -> UserId {
        self.user
    }

    async fn post_author(&mut self, p: PostId) -> anyhow::Result<Option<UserId>> {
        Ok(
            sqlx::query_as::<_, (Uuid,)>("SELECT author_id FROM posts WHERE id = $1")
                .bind(p.0)
                .fetch_optional(&mut *self.conn)
                .await
                .with_context(|| format!("fetching author of post {p:?}"))?
                .map(|(u,)| UserId(u)),
        )
    }

    async fn comment_info(&mut self, c: CommentId) -> anyhow::Result<Option<CommentInfo>> {
        Ok(sqlx::query_as::<_, (Uuid, Uuid, bool)>(
            "SELECT author_id, post_id, is_deleted FROM comments WHERE id = $1",
        )
        .bind(c.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("fetching info of comment {c:?}"))?
        .map(|(author_id, post_id, is_deleted)| CommentInfo {
            author_id: UserId(author_id),
            post_id: PostId(post_id),
            is_deleted,
        }))
    }

    async fn category_exists(&mut self, c: CategoryId) -> anyhow::Result<bool> {
        Ok(sqlx::query("SELECT 1 FROM categories WHERE id = $1")
            .bind(c.0)
            .fetch_optional(&mut *self.conn)
            .await
            .with_context(|| format!("checking whether category {c:?} exists"))?
            .is_some())
    }

    async fn segment_in_post(&mut self, p: PostId, s: SegmentId) -> anyhow::Result<bool> {
        Ok(
            sqlx::query("SELECT 1 FROM post_segments WHERE id = $1 AND post_id = $2")
                .bind(s.0)
                .bind(p.0)
                .fetch_optional(&mut *self.conn)
                .await
                .with_context(|| format!("checking segment {s:?} is in post {p:?}"))?
                .is_some(),
        )
    }

    async fn item_in_segment(&mut self, s: SegmentId, i: SegmentItemId) -> anyhow::Result<bool> {
        Ok(
            sqlx::query("SELECT 1 FROM post_segment_items WHERE id = $1 AND segment_id = $2")
                .bind(i.0)
                .bind(s.0)
                .fetch_optional(&mut *self.conn)
                .await
                .with_context(|| format!("checking item {i:?} is in segment {s:?}"))?
                .is_some(),
        )
    }
}

/// Runs an already validated and authorized action
pub async fn execute(db: &mut PgDb<'_>, action: Action, now: Time) -> Result<Effect, Error> {
    let user = db.user;
    let conn = &mut *db.conn;
    match action {
        Action::Upvote(c) => vote_comment(conn, user, c, Vote::Up).await,
        Action::Downvote(c) => vote_comment(conn, user, c, Vote::Down).await,
        Action::ToggleLike(p) => toggle_like(conn, user, p).await,
        Action::NewComment(c) => new_comment(conn, user, c, now).await,
        Action::DeleteComment(c) => {
            let post = sqlx::query_as::<_, (Uuid,)>(
                "UPDATE comments SET is_deleted = true, text = '' WHERE id = $1 RETURNING post_id",
            )
            .bind(c.0)
            .fetch_optional(conn)
            .await
            .with_context(|| format!("deleting comment {c:?}"))?;
            match post {
                Some((post,)) => Ok(Effect::CommentDeleted {
                    post_id: PostId(post),
                    comment_id: c,
                }),
                None => Err(Error::not_found(c.0)),
            }
        }
        Action::UpdateAvatar(avatar) => {
            sqlx::query(
                "UPDATE users SET avatar_image_id = $2, avatar_blur_data_url = $3 WHERE id = $1",
            )
            .bind(user.0)
            .bind(&avatar.image_id.0)
            .bind(&avatar.blur_data_url)
            .execute(conn)
            .await
            .with_context(|| format!("updating avatar of {user:?}"))?;
            Ok(Effect::AvatarChanged {
                user_id: user,
                avatar,
            })
        }
        Action::SetDonationLinks(links) => {
            sqlx::query("DELETE FROM donation_links WHERE user_id = $1")
                .bind(user.0)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("clearing donation links of {user:?}"))?;
            for (pos, l) in links.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO donation_links (user_id, position, kind, address) VALUES ($1, $2, $3, $4)",
                )
                .bind(user.0)
                .bind(position(pos)?)
                .bind(&l.kind)
                .bind(&l.address)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("inserting donation link of {user:?}"))?;
            }
            Ok(Effect::DonationLinksChanged {
                user_id: user,
                links,
            })
        }
        Action::NewPost(p) => new_post(conn, user, p, now).await,
        Action::EditSegment {
            post_id,
            segment_id,
            title,
            subtitle,
        } => {
            sqlx::query("UPDATE post_segments SET title = $3, subtitle = $4 WHERE id = $1 AND post_id = $2")
                .bind(segment_id.0)
                .bind(post_id.0)
                .bind(&title)
                .bind(&subtitle)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("editing segment {segment_id:?}"))?;
            segment_edited(conn, post_id, segment_id, now).await
        }
        Action::EditSegmentItem {
            post_id,
            segment_id,
            item_id,
            title,
            description,
        } => {
            sqlx::query(
                "UPDATE post_segment_items SET title = $3, description = $4 WHERE id = $1 AND segment_id = $2",
            )
            .bind(item_id.0)
            .bind(segment_id.0)
            .bind(&title)
            .bind(&description)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("editing segment item {item_id:?}"))?;
            segment_edited(conn, post_id, segment_id, now).await
        }
    }
}

fn position(pos: usize) -> anyhow::Result<i32> {
    i32::try_from(pos).with_context(|| format!("position {pos} does not fit in the database"))
}

async fn vote_comment(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    comment: CommentId,
    clicked: Vote,
) -> Result<Effect, Error> {
    // lock the comment so that concurrent clicks of the same user serialize
    let locked = sqlx::query_as::<_, (Uuid, bool)>(
        "SELECT post_id, is_deleted FROM comments WHERE id = $1 FOR UPDATE",
    )
    .bind(comment.0)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("locking comment {comment:?}"))?;
    let post = match locked {
        Some((post, false)) => PostId(post),
        _ => return Err(Error::not_found(comment.0)),
    };

    let current = sqlx::query_as::<_, (bool,)>(
        "SELECT is_upvote FROM comment_votes WHERE comment_id = $1 AND user_id = $2",
    )
    .bind(comment.0)
    .bind(user.0)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("fetching vote of {user:?} on {comment:?}"))?
    .map(|(is_upvote,)| vote_from_db(is_upvote));

    match Vote::toggle(current, clicked) {
        None => {
            sqlx::query("DELETE FROM comment_votes WHERE comment_id = $1 AND user_id = $2")
                .bind(comment.0)
                .bind(user.0)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("removing vote of {user:?} on {comment:?}"))?;
        }
        Some(v) => {
            sqlx::query(
                "
                    INSERT INTO comment_votes (comment_id, user_id, is_upvote)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (comment_id, user_id)
                    DO UPDATE SET is_upvote = EXCLUDED.is_upvote
                ",
            )
            .bind(comment.0)
            .bind(user.0)
            .bind(v == Vote::Up)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("recording vote of {user:?} on {comment:?}"))?;
        }
    }

    let votes = sqlx::query_as::<_, (Uuid, bool)>(
        "SELECT user_id, is_upvote FROM comment_votes WHERE comment_id = $1",
    )
    .bind(comment.0)
    .fetch(conn)
    .map_ok(|(u, is_upvote)| (UserId(u), vote_from_db(is_upvote)))
    .try_collect::<Vec<_>>()
    .await
    .with_context(|| format!("fetching votes on {comment:?}"))?
    .into_iter()
    .collect::<VoteLedger>();
    Ok(Effect::CommentVoted {
        post_id: post,
        comment_id: comment,
        votes,
    })
}

async fn toggle_like(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    post: PostId,
) -> Result<Effect, Error> {
    // lock the post so that concurrent toggles of the same user serialize
    if sqlx::query("SELECT 1 FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("locking post {post:?}"))?
        .is_none()
    {
        return Err(Error::not_found(post.0));
    }
    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
        .bind(post.0)
        .bind(user.0)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("removing like of {user:?} on {post:?}"))?;
    if removed.rows_affected() == 0 {
        sqlx::query("INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2)")
            .bind(post.0)
            .bind(user.0)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("adding like of {user:?} on {post:?}"))?;
    }
    let liked_by = sqlx::query_as::<_, (Uuid,)>("SELECT user_id FROM post_likes WHERE post_id = $1")
        .bind(post.0)
        .fetch(conn)
        .map_ok(|(u,)| UserId(u))
        .try_collect::<Vec<_>>()
        .await
        .with_context(|| format!("fetching likes of {post:?}"))?
        .into_iter()
        .collect::<LikeLedger>();
    Ok(Effect::PostLiked {
        post_id: post,
        user_id: user,
        liked_by,
    })
}

async fn id_used(conn: &mut sqlx::PgConnection, table: &str, id: Uuid) -> anyhow::Result<bool> {
    Ok(sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("checking whether {id} is used in {table}"))?
        .is_some())
}

async fn new_comment(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    c: NewComment,
    now: Time,
) -> Result<Effect, Error> {
    if id_used(&mut *conn, "comments", c.id.0).await? {
        return Err(Error::uuid_already_used(c.id.0));
    }
    sqlx::query(
        "
            INSERT INTO comments (id, post_id, parent_id, author_id, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(c.id.0)
    .bind(c.post_id.0)
    .bind(c.parent_id.map(|p| p.0))
    .bind(user.0)
    .bind(&c.text)
    .bind(now)
    .execute(conn)
    .await
    .with_context(|| format!("inserting comment {:?}", c.id))?;
    Ok(Effect::CommentAdded(c.into_comment(user, now)))
}

async fn new_post(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    p: NewPost,
    now: Time,
) -> Result<Effect, Error> {
    if id_used(&mut *conn, "posts", p.id.0).await? {
        return Err(Error::uuid_already_used(p.id.0));
    }
    for s in p.segments.iter() {
        if id_used(&mut *conn, "post_segments", s.id.0).await? {
            return Err(Error::uuid_already_used(s.id.0));
        }
        for i in s.items.iter() {
            if id_used(&mut *conn, "post_segment_items", i.id.0).await? {
                return Err(Error::uuid_already_used(i.id.0));
            }
        }
    }

    sqlx::query(
        "
            INSERT INTO posts (id, author_id, category_id, title, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ",
    )
    .bind(p.id.0)
    .bind(user.0)
    .bind(p.category_id.0)
    .bind(&p.title)
    .bind(&p.description)
    .bind(now)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("inserting post {:?}", p.id))?;
    for t in p.tags.iter() {
        sqlx::query("INSERT INTO post_tags (post_id, tag) VALUES ($1, $2)")
            .bind(p.id.0)
            .bind(t)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("tagging post {:?} with {t:?}", p.id))?;
    }
    for (pos, s) in p.segments.iter().enumerate() {
        sqlx::query(
            "
                INSERT INTO post_segments (id, post_id, position, title, subtitle, image_id)
                VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(s.id.0)
        .bind(p.id.0)
        .bind(position(pos)?)
        .bind(&s.title)
        .bind(&s.subtitle)
        .bind(s.image_id.as_ref().map(|i| &i.0))
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting segment {:?}", s.id))?;
        for (pos, i) in s.items.iter().enumerate() {
            sqlx::query(
                "
                    INSERT INTO post_segment_items (id, segment_id, position, title, description)
                    VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(i.id.0)
            .bind(s.id.0)
            .bind(position(pos)?)
            .bind(&i.title)
            .bind(&i.description)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting segment item {:?}", i.id))?;
        }
    }
    Ok(Effect::PostCreated(p.into_post(user, now)))
}

async fn segment_edited(
    conn: &mut sqlx::PgConnection,
    post: PostId,
    segment: SegmentId,
    now: Time,
) -> Result<Effect, Error> {
    sqlx::query("UPDATE posts SET updated_at = $2 WHERE id = $1")
        .bind(post.0)
        .bind(now)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("bumping updated_at of post {post:?}"))?;
    let segment = fetch_post(conn, post)
        .await?
        .segment(segment)
        .cloned()
        .ok_or_else(|| Error::not_found(segment.0))?;
    Ok(Effect::SegmentEdited {
        post_id: post,
        segment,
        updated_at: now,
    })
}

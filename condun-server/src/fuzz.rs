#![cfg(test)]

use std::{fmt::Debug, panic::AssertUnwindSafe};

use bolero::generator::TypeGenerator;

use axum::{
    extract::FromRequestParts,
    http::{self, Method},
};
use chrono::TimeZone;
use condun_api::{
    Action, Avatar, Category, CategoryId, Comment, CommentId, Effect, Error as ApiError, ImageId,
    NewComment, NewPost, NewSession, NewUser, Post, PostId, PostOrder, PostSearch, PostSegment,
    Query, SegmentId, User, UserId,
};
use condun_mock_server::MockServer;
use tower::ServiceExt;

use crate::{extractors::*, *};

fn test_runtime() -> AssertUnwindSafe<tokio::runtime::Runtime> {
    AssertUnwindSafe(
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("building tokio runtime"),
    )
}

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = test_runtime();
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |input| runtime.block_on($fn(input)))
        }
    };
}

/// Runs against the database at `CONDUN_TEST_DATABASE_URL`, which gets wiped before each
/// input; the test is skipped when the variable is not set
macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            let Ok(url) = std::env::var("CONDUN_TEST_DATABASE_URL") else {
                eprintln!("skipping {}: no CONDUN_TEST_DATABASE_URL", stringify!($name));
                return;
            };
            let runtime = test_runtime();
            let pool = AssertUnwindSafe(runtime.block_on(async {
                let pool = create_sqlx_pool(&url).await.expect("connecting to test db");
                MIGRATOR.run(&pool).await.expect("migrating test db");
                pool
            }));
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |input| {
                    runtime.block_on(async {
                        sqlx::query(include_str!("../reset-test-db.sql"))
                            .execute(&*pool)
                            .await
                            .expect("resetting test db");
                        $fn(pool.0.clone(), input).await
                    })
                });
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |header: String| async move {
    let Ok(req) = http::Request::get("/")
        .header(http::header::AUTHORIZATION, header)
        .body(())
    else {
        return;
    };
    let mut parts = req.into_parts().0;
    match PreAuth::from_request_parts(&mut parts, &()).await {
        Ok(_) | Err(Error::Api(ApiError::Unauthorized)) => (),
        Err(e) => panic!("unexpected rejection: {e}"),
    }
});

/// Sends `body` as JSON to `uri`, decoding either the `Resp` or the API error
async fn request<Req, Resp>(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: for<'de> serde::Deserialize<'de>,
{
    let mut req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("encoding request body"),
        ))
        .expect("building request");
    let resp = app.clone().oneshot(req).await.expect("calling app");
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("reading response body");
    if !status.is_success() {
        return Err(ApiError::parse(&bytes)
            .unwrap_or_else(|err| panic!("undecodable error {bytes:?} ({err:#})")));
    }
    // unit responses come back with an empty body
    let bytes = if bytes.is_empty() { &b"null"[..] } else { &bytes[..] };
    Ok(serde_json::from_slice(bytes).unwrap_or_else(|err| {
        panic!("undecodable response {bytes:?} to {uri} with {body:?}: {err}")
    }))
}

// Rejections must happen before any database access, so a pool that cannot connect is enough
fn offline_app(admin_token: Uuid) -> Router {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://localhost/condun-offline")
        .expect("building lazy pool");
    app(pool, Some(AuthToken(admin_token)))
}

do_tokio_test!(fuzz_bearer_routes_need_a_token, u8, |route: u8| async move {
    let app = offline_app(Uuid::new_v4());
    let res: Result<(), ApiError> = match route % 3 {
        0 => request(&app, Method::GET, "/api/whoami", None, &()).await,
        1 => request(&app, Method::POST, "/api/unauth", None, &()).await,
        _ => {
            let a = Action::ToggleLike(PostId(Uuid::new_v4()));
            request(&app, Method::POST, "/api/submit-action", None, &a).await
        }
    };
    assert_eq!(res, Err(ApiError::Unauthorized));
});

do_tokio_test!(fuzz_admin_routes_check_the_token, u128, |token: u128| async move {
    let admin_token = Uuid::new_v4();
    let app = offline_app(admin_token);
    let token = Uuid::from_u128(token);
    let category = Category {
        id: CategoryId(Uuid::new_v4()),
        name: String::from("travel"),
    };
    let res: Result<(), ApiError> = request(
        &app,
        Method::POST,
        "/api/admin/create-category",
        Some(token),
        &category,
    )
    .await;
    if token != admin_token {
        assert_eq!(res, Err(ApiError::PermissionDenied));
    }
    let res: Result<(), ApiError> =
        request(&app, Method::POST, "/api/admin/create-category", None, &category).await;
    assert_eq!(res, Err(ApiError::Unauthorized));
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        name: u8,
    },
    Auth {
        uid: usize,
        wrong_password: bool,
    },
    Unauth {
        sid: usize,
    },
    Whoami {
        sid: usize,
    },
    NewPost {
        sid: usize,
        tag: u8,
    },
    Reply {
        sid: usize,
        post: usize,
        parent: Option<usize>,
    },
    Upvote {
        sid: usize,
        comment: usize,
    },
    Downvote {
        sid: usize,
        comment: usize,
    },
    DeleteComment {
        sid: usize,
        comment: usize,
    },
    ToggleLike {
        sid: usize,
        post: usize,
    },
    EditSegment {
        sid: usize,
        post: usize,
        title: u8,
    },
    UpdateAvatar {
        sid: usize,
        image: u8,
    },
    ViewPost {
        post: usize,
    },
    FetchComments {
        post: usize,
    },
    FetchUsers,
    Search {
        tag: Option<u8>,
        order: u8,
    },
}

/// Maps a fuzzed index onto `0..len`, if there is anything to pick from
fn pick(fuzz_id: usize, len: usize) -> Option<usize> {
    (len > 0).then(|| fuzz_id % len)
}

// Both sides pick their own timestamps, so those are left out of comparisons
fn epoch() -> condun_api::Time {
    chrono::Utc.timestamp_opt(0, 0).unwrap()
}

fn untimed_post(mut p: Post) -> Post {
    p.created_at = epoch();
    p.updated_at = p.updated_at.map(|_| epoch());
    p
}

fn untimed_comment(mut c: Comment) -> Comment {
    c.created_at = epoch();
    c
}

fn untimed_effect(e: Effect) -> Effect {
    match e {
        Effect::CommentAdded(c) => Effect::CommentAdded(untimed_comment(c)),
        Effect::PostCreated(p) => Effect::PostCreated(untimed_post(p)),
        Effect::SegmentEdited {
            post_id, segment, ..
        } => Effect::SegmentEdited {
            post_id,
            segment,
            updated_at: epoch(),
        },
        e => e,
    }
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

struct Session {
    app: AuthToken,
    mock: AuthToken,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    sessions: Vec<Session>,
    category: CategoryId,
    posts: Vec<(PostId, SegmentId)>,
    comments: Vec<CommentId>,
}

impl ComparativeFuzzer {
    async fn new(pool: sqlx::PgPool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        let mut res = ComparativeFuzzer {
            admin_token,
            app: app(pool, Some(AuthToken(admin_token))),
            mock: MockServer::new(),
            sessions: Vec::new(),
            category: CategoryId(Uuid::new_v4()),
            posts: Vec::new(),
            comments: Vec::new(),
        };
        let category = Category {
            id: res.category,
            name: String::from("travel"),
        };
        compare(
            "CreateCategory",
            request(
                &res.app,
                Method::POST,
                "/api/admin/create-category",
                Some(admin_token),
                &category,
            )
            .await,
            res.mock.admin_create_category(category),
        );
        res
    }

    fn session(&self, sid: usize) -> Option<&Session> {
        pick(sid, self.sessions.len()).map(|s| &self.sessions[s])
    }

    async fn submit(&mut self, sid: usize, a: Action) {
        let Some(s) = self.session(sid) else { return };
        let (app_tok, mock_tok) = (s.app.0, s.mock);
        let app_res: Result<Effect, ApiError> = request(
            &self.app,
            Method::POST,
            "/api/submit-action",
            Some(app_tok),
            &a,
        )
        .await;
        let mock_res = self.mock.submit_action(mock_tok, a.clone()).await;
        compare(
            &format!("SubmitAction({a:?})"),
            app_res.map(untimed_effect),
            mock_res.map(untimed_effect),
        );
    }

    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { name } => {
                // no hashing for tests
                let new_user = NewUser {
                    id: UserId(Uuid::new_v4()),
                    name: format!("user{name}"),
                    initial_password_hash: format!("password{name}"),
                };
                let pass = new_user.initial_password_hash.clone();
                compare(
                    "CreateUser",
                    request(
                        &self.app,
                        Method::POST,
                        "/api/admin/create-user",
                        Some(self.admin_token),
                        &new_user,
                    )
                    .await,
                    self.mock.admin_create_user(new_user, pass),
                )
            }
            FuzzOp::Auth {
                uid,
                wrong_password,
            } => {
                let Some(uid) = pick(uid, self.mock.user_count()) else { return };
                let (user, password) = self.mock.credentials(uid);
                let session = NewSession {
                    user: String::from(user),
                    password: match wrong_password {
                        true => format!("not {password}"),
                        false => String::from(password),
                    },
                    device: String::from("fuzzer"),
                    pow: String::new(),
                };
                let app_tok =
                    request(&self.app, Method::POST, "/api/auth", None, &session).await;
                let mock_tok = self.mock.auth(session);
                if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                    self.sessions.push(Session { app, mock });
                }
                compare("Auth", app_tok.map(|_| ()), mock_tok.map(|_| ()));
            }
            FuzzOp::Unauth { sid } => {
                let Some(s) = pick(sid, self.sessions.len()) else { return };
                let s = self.sessions.remove(s);
                compare(
                    "Unauth",
                    request(&self.app, Method::POST, "/api/unauth", Some(s.app.0), &()).await,
                    self.mock.unauth(s.mock),
                );
                // a second logout must be refused the same way
                compare(
                    "Unauth",
                    request(&self.app, Method::POST, "/api/unauth", Some(s.app.0), &()).await,
                    self.mock.unauth(s.mock),
                );
            }
            FuzzOp::Whoami { sid } => {
                let Some(s) = self.session(sid) else { return };
                let (app_tok, mock_tok) = (s.app.0, s.mock);
                compare(
                    "Whoami",
                    request::<_, UserId>(
                        &self.app,
                        Method::GET,
                        "/api/whoami",
                        Some(app_tok),
                        &(),
                    )
                    .await,
                    self.mock.whoami(mock_tok),
                );
            }
            FuzzOp::NewPost { sid, tag } => {
                let (post, segment) = (PostId(Uuid::new_v4()), SegmentId(Uuid::new_v4()));
                let a = Action::NewPost(NewPost {
                    id: post,
                    title: format!("post about {tag}"),
                    description: String::from("fuzzed"),
                    category_id: self.category,
                    tags: [format!("tag{}", tag % 4)].into_iter().collect(),
                    segments: vec![PostSegment {
                        id: segment,
                        title: String::from("first day"),
                        subtitle: None,
                        image_id: None,
                        items: Vec::new(),
                    }],
                });
                if self.session(sid).is_some() {
                    self.posts.push((post, segment));
                }
                self.submit(sid, a).await;
            }
            FuzzOp::Reply { sid, post, parent } => {
                let Some(post) = pick(post, self.posts.len()) else { return };
                let parent = parent
                    .and_then(|p| pick(p, self.comments.len()))
                    .map(|p| self.comments[p]);
                let id = CommentId(Uuid::new_v4());
                if self.session(sid).is_some() {
                    self.comments.push(id);
                }
                let a = Action::NewComment(NewComment {
                    id,
                    post_id: self.posts[post].0,
                    parent_id: parent,
                    text: String::from("fuzzed reply"),
                });
                self.submit(sid, a).await;
            }
            FuzzOp::Upvote { sid, comment } | FuzzOp::Downvote { sid, comment } => {
                let Some(c) = pick(comment, self.comments.len()) else { return };
                let c = self.comments[c];
                let a = match op {
                    FuzzOp::Upvote { .. } => Action::Upvote(c),
                    _ => Action::Downvote(c),
                };
                self.submit(sid, a).await;
            }
            FuzzOp::DeleteComment { sid, comment } => {
                let Some(c) = pick(comment, self.comments.len()) else { return };
                let a = Action::DeleteComment(self.comments[c]);
                self.submit(sid, a).await;
            }
            FuzzOp::ToggleLike { sid, post } => {
                let Some(p) = pick(post, self.posts.len()) else { return };
                let a = Action::ToggleLike(self.posts[p].0);
                self.submit(sid, a).await;
            }
            FuzzOp::EditSegment { sid, post, title } => {
                let Some(p) = pick(post, self.posts.len()) else { return };
                let (post_id, segment_id) = self.posts[p];
                let a = Action::EditSegment {
                    post_id,
                    segment_id,
                    title: format!("day {title}"),
                    subtitle: Some(String::from("edited")),
                };
                self.submit(sid, a).await;
            }
            FuzzOp::UpdateAvatar { sid, image } => {
                let a = Action::UpdateAvatar(Avatar {
                    image_id: ImageId(format!("img-{image}")),
                    blur_data_url: String::from("data:image/png;base64,AAAA"),
                });
                self.submit(sid, a).await;
            }
            FuzzOp::ViewPost { post } => {
                let Some(p) = pick(post, self.posts.len()) else { return };
                let post = self.posts[p].0;
                compare(
                    "ViewPost",
                    request(
                        &self.app,
                        Method::POST,
                        &format!("/api/post/{}/view", post.0),
                        None,
                        &(),
                    )
                    .await,
                    self.mock.view_post(post),
                );
            }
            FuzzOp::FetchComments { post } => {
                let Some(p) = pick(post, self.posts.len()) else { return };
                let post = self.posts[p].0;
                let by_id = |comments: Vec<Comment>| {
                    let mut comments = comments
                        .into_iter()
                        .map(untimed_comment)
                        .collect::<Vec<_>>();
                    comments.sort_unstable_by_key(|c| c.id);
                    comments
                };
                compare(
                    "FetchComments",
                    request(
                        &self.app,
                        Method::GET,
                        &format!("/api/post/{}/comments", post.0),
                        None,
                        &(),
                    )
                    .await
                    .map(by_id),
                    self.mock.fetch_comments(post).map(by_id),
                );
            }
            FuzzOp::FetchUsers => {
                compare(
                    "FetchUsers",
                    request::<_, Vec<User>>(
                        &self.app,
                        Method::GET,
                        "/api/fetch-users",
                        None,
                        &(),
                    )
                    .await,
                    self.mock.fetch_users(),
                );
            }
            FuzzOp::Search { tag, order } => {
                let filter = match tag {
                    Some(t) => Query::Tag(format!("tag{}", t % 4)),
                    None => Query::everything(),
                };
                let order = match order % 4 {
                    0 => PostOrder::Newest,
                    1 => PostOrder::Oldest,
                    2 => PostOrder::MostLiked,
                    _ => PostOrder::MostViewed,
                };
                let search = PostSearch::new(filter, order);
                let time_ordered = matches!(order, PostOrder::Newest | PostOrder::Oldest);
                // creation times can tie on one side and not the other
                let comparable = |posts: Vec<Post>| {
                    let mut posts = posts.into_iter().map(untimed_post).collect::<Vec<_>>();
                    if time_ordered {
                        posts.sort_unstable_by_key(|p| p.id);
                    }
                    posts
                };
                compare(
                    "SearchPosts",
                    request(&self.app, Method::POST, "/api/search-posts", None, &search)
                        .await
                        .map(comparable),
                    self.mock.search_posts(search).map(comparable),
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);

use anyhow::{anyhow, Context};
use condun_client::{
    api::{
        self, AuthToken, Category, CategoryId, Comment, CommentOrder, NewUser, Post, PostOrder,
        PostSearch, User, UserId, Uuid,
    },
    build_forest, parse_search, CommentNode, DbDump, OrderExt,
};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        initial_password: String,
    },

    /// Create a post category
    CreateCategory { name: String },

    /// List the posts matching a search, as typed in the search bar
    Search {
        #[structopt(long, default_value = "20")]
        limit: u32,

        /// eg. `tag:food (lisbon or porto) -author:alice`
        search: Vec<String>,
    },

    /// Print the comment tree of a post, best comments first
    Comments { post: Uuid },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

fn client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

/// Sends `req`, turning error responses back into `api::Error`s
async fn checked(req: RequestBuilder) -> anyhow::Result<reqwest::Response> {
    let resp = req.send().await.context("sending request")?;
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response")?;
    match api::Error::parse(&body) {
        Ok(err) => Err(anyhow!(err)),
        Err(_) => Err(anyhow!("server answered {status}: {body:?}")),
    }
}

async fn send<R>(req: RequestBuilder) -> anyhow::Result<R>
where
    R: for<'de> serde::Deserialize<'de>,
{
    checked(req)
        .await?
        .json()
        .await
        .context("parsing response")
}

async fn fetch_dump(client: &ClientWithMiddleware, host: &str) -> anyhow::Result<DbDump> {
    let mut db = DbDump::stub();
    db.add_users(
        send::<Vec<User>>(client.get(format!("{host}/api/fetch-users")))
            .await
            .context("fetching users")?,
    );
    db.add_categories(
        send::<Vec<Category>>(client.get(format!("{host}/api/fetch-categories")))
            .await
            .context("fetching categories")?,
    );
    Ok(db)
}

fn author_name(db: &DbDump, user: UserId) -> &str {
    db.users.get(&user).map(|u| &u.name as &str).unwrap_or("?")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let host = opt.host.trim_end_matches('/');
    let client = client();

    match opt.cmd {
        Command::CreateUser {
            name,
            initial_password,
        } => {
            let user = NewUser::new(UserId(Uuid::new_v4()), name, initial_password);
            checked(
                client
                    .post(format!("{host}/api/admin/create-user"))
                    .json(&user)
                    .bearer_auth(admin_token()?.0),
            )
            .await
            .with_context(|| format!("creating user {:?}", user.name))?;
            println!("{}", user.id.0);
        }
        Command::CreateCategory { name } => {
            let category = Category {
                id: CategoryId(Uuid::new_v4()),
                name,
            };
            checked(
                client
                    .post(format!("{host}/api/admin/create-category"))
                    .json(&category)
                    .bearer_auth(admin_token()?.0),
            )
            .await
            .with_context(|| format!("creating category {:?}", category.name))?;
            println!("{}", category.id.0);
        }
        Command::Search { limit, search } => {
            let db = fetch_dump(&client, host).await?;
            let filter = parse_search(&db, &search.join(" "))?;
            let search = PostSearch {
                limit: Some(limit),
                ..PostSearch::new(filter, PostOrder::Newest)
            };
            tracing::debug!(?search, "searching posts");
            let posts = send::<Vec<Post>>(client.post(format!("{host}/api/search-posts")).json(&search))
                .await
                .context("searching posts")?;
            for p in posts {
                println!(
                    "{}  {}  by {}  ({} likes, {} views)",
                    p.id.0,
                    p.title,
                    author_name(&db, p.author_id),
                    p.liked_by.len(),
                    p.view_count,
                );
            }
        }
        Command::Comments { post } => {
            let db = fetch_dump(&client, host).await?;
            let mut comments = send::<Vec<Comment>>(
                client.get(format!("{host}/api/post/{post}/comments")),
            )
            .await
            .with_context(|| format!("fetching comments of post {post}"))?;
            CommentOrder::Top.sort(&mut comments);
            let forest = build_forest(&comments);
            for (level, c) in CommentNode::walk(&forest) {
                let text = match c.is_deleted {
                    true => "[deleted]",
                    false => &c.text as &str,
                };
                println!(
                    "{:indent$}[{:+}] {}: {}",
                    "",
                    c.score(),
                    author_name(&db, c.author_id),
                    text.replace('\n', " "),
                    indent = level * 2,
                );
            }
        }
    }

    Ok(())
}

use std::collections::{BTreeMap, HashMap};

use condun_client::{
    api::{
        Action, AuthToken, Category, Comment, Effect, Error, NewSession, NewUser, Post, PostId,
        PostSearch, User, UserId, Uuid,
    },
    DbDump,
};

/// In-memory stand-in for the server, answering the same calls with the same results
pub struct MockServer {
    accounts: BTreeMap<UserId, Account>,
    sessions: HashMap<AuthToken, UserId>,
    db: DbDump,
}

// Passwords are never hashed here: `password_hash` is compared as-is
#[derive(Debug)]
struct Account {
    name: String,
    password: String,
    password_hash: String,
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            accounts: BTreeMap::new(),
            sessions: HashMap::new(),
            db: DbDump::stub(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.accounts.len()
    }

    /// Name and password of the `n`-th user, in id order
    pub fn credentials(&self, n: usize) -> (&str, &str) {
        let a = self
            .accounts
            .values()
            .nth(n)
            .unwrap_or_else(|| panic!("no user {n} among {}", self.accounts.len()));
        (&a.name, &a.password)
    }

    /// Everything the server currently stores
    pub fn db(&self) -> &DbDump {
        &self.db
    }

    pub fn admin_create_user(&mut self, u: NewUser, password: String) -> Result<(), Error> {
        u.validate()?;
        if self.accounts.contains_key(&u.id) {
            return Err(Error::UuidAlreadyUsed(u.id.0));
        }
        if self.db.user_id(&u.name).is_some() {
            return Err(Error::NameAlreadyUsed(u.name));
        }
        self.db.add_users(vec![User::new(u.id, u.name.clone())]);
        self.accounts.insert(
            u.id,
            Account {
                name: u.name,
                password,
                password_hash: u.initial_password_hash,
            },
        );
        Ok(())
    }

    pub fn admin_create_category(&mut self, c: Category) -> Result<(), Error> {
        c.validate()?;
        if self.db.categories.contains_key(&c.id) {
            return Err(Error::UuidAlreadyUsed(c.id.0));
        }
        if self.db.category_id(&c.name).is_some() {
            return Err(Error::NameAlreadyUsed(c.name));
        }
        self.db.add_categories(vec![c]);
        Ok(())
    }

    pub fn auth(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        let user = self
            .accounts
            .iter()
            .find(|(_, a)| a.name == s.user && a.password_hash == s.password)
            .map(|(id, _)| *id)
            .ok_or(Error::PermissionDenied)?;
        let token = AuthToken(Uuid::new_v4());
        self.sessions.insert(token, user);
        Ok(token)
    }

    fn resolve(&self, token: AuthToken) -> Result<UserId, Error> {
        self.sessions
            .get(&token)
            .copied()
            .ok_or(Error::Unauthorized)
    }

    pub fn unauth(&mut self, token: AuthToken) -> Result<(), Error> {
        self.sessions
            .remove(&token)
            .map(|_| ())
            .ok_or(Error::Unauthorized)
    }

    pub fn whoami(&self, token: AuthToken) -> Result<UserId, Error> {
        self.resolve(token)
    }

    pub fn fetch_users(&self) -> Result<Vec<User>, Error> {
        let mut users = self.db.users.values().cloned().collect::<Vec<_>>();
        users.sort_unstable_by_key(|u| u.id);
        Ok(users)
    }

    pub fn fetch_categories(&self) -> Result<Vec<Category>, Error> {
        let mut categories = self.db.categories.values().cloned().collect::<Vec<_>>();
        categories.sort_unstable_by_key(|c| c.id);
        Ok(categories)
    }

    pub fn search_posts(&self, s: PostSearch) -> Result<Vec<Post>, Error> {
        s.validate()?;
        Ok(self
            .db
            .search(&s)
            .into_iter()
            .map(|p| Post::clone(&p))
            .collect())
    }

    pub fn fetch_post(&self, post: PostId) -> Result<Post, Error> {
        self.db
            .posts
            .get(&post)
            .map(|p| Post::clone(p))
            .ok_or(Error::NotFound(post.0))
    }

    /// In creation order, with the text of deleted comments removed
    pub fn fetch_comments(&self, post: PostId) -> Result<Vec<Comment>, Error> {
        if !self.db.posts.contains_key(&post) {
            return Err(Error::NotFound(post.0));
        }
        Ok(self
            .db
            .comments_for(post)
            .iter()
            .cloned()
            .map(Comment::redacted)
            .collect())
    }

    pub fn view_post(&mut self, post: PostId) -> Result<Effect, Error> {
        self.db.record_view(post)
    }

    pub async fn submit_action(&mut self, tok: AuthToken, a: Action) -> Result<Effect, Error> {
        let user = self.resolve(tok)?;
        tracing::debug!(?user, action = ?a, "submitting action");
        self.db.submit(user, a, chrono::Utc::now()).await
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}

mod cache;
pub use cache::{Cache, MemoryCache};

mod db;
pub use db::{AsUser, DbDump};

mod order;
pub use order::OrderExt;

mod query;
pub use query::QueryExt;

mod reconcile;
pub use reconcile::{reconcile, Outcome, Reconciliation};

mod search;
pub use search::parse_search;

mod tree;
pub use tree::{build_forest, CommentNode};

mod view;
pub use view::{AuthorView, CommentView, PostDetail, PostSummary, View, ViewKey};

pub mod api {
    pub use condun_api::*;
}

pub mod prelude {
    pub use crate::{Cache, OrderExt, QueryExt};
}

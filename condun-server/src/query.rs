use condun_api::{PostOrder, Query, Uuid};

#[derive(Debug, Eq, PartialEq)]
pub enum Bind {
    Uuid(Uuid),
    String(String),
}

/// WHERE clause under construction, its placeholders numbered from `first_bind`
#[derive(Debug)]
pub struct Sql {
    pub where_clause: String,
    pub binds: Vec<Bind>,
    first_bind: usize,
}

/// Assumes tables p (posts) and vpx (v_posts_text) are available
pub fn to_postgres(q: &Query, first_bind: usize) -> Sql {
    let mut sql = Sql {
        where_clause: String::new(),
        binds: Vec::new(),
        first_bind,
    };
    sql.push(q);
    sql
}

impl Sql {
    /// Records `b`, returning the placeholder that refers to it
    fn bind(&mut self, b: Bind) -> String {
        self.binds.push(b);
        format!("${}", self.first_bind + self.binds.len() - 1)
    }

    fn push_joined(&mut self, queries: &[Query], op: &str, if_empty: &str) {
        self.where_clause.push('(');
        if queries.is_empty() {
            self.where_clause.push_str(if_empty);
        }
        for (i, q) in queries.iter().enumerate() {
            if i > 0 {
                self.where_clause.push_str(op);
            }
            self.push(q);
        }
        self.where_clause.push(')');
    }

    fn push(&mut self, q: &Query) {
        let cond = match q {
            Query::Any(queries) => return self.push_joined(queries, " OR ", "false"),
            Query::All(queries) => return self.push_joined(queries, " AND ", "true"),
            Query::Not(q) => {
                self.where_clause.push_str("NOT ");
                return self.push(q);
            }
            Query::Category(c) => {
                format!("(p.category_id = {})", self.bind(Bind::Uuid(c.0)))
            }
            Query::Author(u) => format!("(p.author_id = {})", self.bind(Bind::Uuid(u.0))),
            Query::Tag(t) => format!(
                "EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag = {})",
                self.bind(Bind::String(t.clone()))
            ),
            Query::LikedBy(u) => format!(
                "EXISTS (SELECT 1 FROM post_likes pl WHERE pl.post_id = p.id AND pl.user_id = {})",
                self.bind(Bind::Uuid(u.0))
            ),
            Query::Phrase(t) => format!(
                "(vpx.text ILIKE {} ESCAPE '\\')",
                self.bind(Bind::String(like_pattern(t)))
            ),
        };
        self.where_clause.push_str(&cond);
    }
}

fn like_pattern(phrase: &str) -> String {
    let mut res = String::with_capacity(phrase.len() + 2);
    res.push('%');
    for c in phrase.chars() {
        if matches!(c, '\\' | '%' | '_') {
            res.push('\\');
        }
        res.push(c);
    }
    res.push('%');
    res
}

/// Ties are broken by id, so that the order is total
pub fn order_by(o: PostOrder) -> &'static str {
    match o {
        PostOrder::Newest => "p.created_at DESC, p.id",
        PostOrder::Oldest => "p.created_at, p.id",
        PostOrder::MostLiked => {
            "(SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) DESC, p.id"
        }
        PostOrder::MostViewed => "p.view_count DESC, p.id",
    }
}

#[cfg(test)]
mod tests {
    use condun_api::{CategoryId, UserId};

    use super::*;

    #[test]
    fn binds_are_numbered_from_the_first_index() {
        let alice = Uuid::from_u128(1);
        let travel = Uuid::from_u128(2);
        let q = Query::All(vec![
            Query::Author(UserId(alice)),
            Query::Any(vec![
                Query::Category(CategoryId(travel)),
                Query::Not(Box::new(Query::Tag(String::from("food")))),
            ]),
        ]);
        let sql = to_postgres(&q, 3);
        assert_eq!(
            sql.where_clause,
            "((p.author_id = $3) AND ((p.category_id = $4) OR NOT EXISTS \
             (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag = $5)))"
        );
        assert_eq!(
            sql.binds,
            vec![
                Bind::Uuid(alice),
                Bind::Uuid(travel),
                Bind::String(String::from("food"))
            ]
        );
    }

    #[test]
    fn everything_is_true() {
        let sql = to_postgres(&Query::everything(), 1);
        assert_eq!(sql.where_clause, "(true)");
        assert!(sql.binds.is_empty());
    }

    #[test]
    fn phrases_escape_like_wildcards() {
        let sql = to_postgres(&Query::Phrase(String::from(r"100%_off\")), 1);
        assert_eq!(sql.where_clause, r"(vpx.text ILIKE $1 ESCAPE '\')");
        assert_eq!(
            sql.binds,
            vec![Bind::String(String::from(r"%100\%\_off\\%"))]
        );
    }
}

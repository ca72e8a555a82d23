use pest::{iterators::Pairs, pratt_parser::PrattParser, Parser};

use crate::{
    api::{Error, Query},
    DbDump,
};

#[derive(pest_derive::Parser)]
#[grammar = "search.pest"]
struct SearchParser;

lazy_static::lazy_static! {
    static ref SEARCH_PARSER: PrattParser<Rule> = {
        use pest::pratt_parser::{Assoc::*, Op};
        use Rule::*;
        PrattParser::new()
            .op(Op::infix(or, Left))
            .op(Op::infix(and, Left) | Op::infix(implicit_and, Left))
            .op(Op::prefix(not))
    };
}

/// Parses a search string as typed in the search bar
///
/// Names after `category:`, `author:` and `liked:` are resolved against `db`.
pub fn parse_search(db: &DbDump, search: &str) -> Result<Query, Error> {
    let mut pairs = SearchParser::parse(Rule::everything, search)
        .map_err(|e| Error::Validation(format!("invalid search {search:?}:\n{e}")))?;
    let query = match pairs.next() {
        // the next pair is EOI
        Some(p) if p.as_rule() == Rule::search => build(db, p.into_inner())?,
        _ => Query::everything(),
    };
    query.validate()?;
    Ok(query)
}

fn build(db: &DbDump, pairs: Pairs<Rule>) -> Result<Query, Error> {
    if pairs.peek().is_none() {
        return Ok(Query::everything());
    }
    SEARCH_PARSER
        .map_primary(|p| {
            let rule = p.as_rule();
            match rule {
                Rule::search => build(db, p.into_inner()),
                Rule::phrase => Ok(Query::Phrase(unescape(p.as_str()))),
                Rule::word => Ok(Query::Phrase(p.as_str().to_string())),
                Rule::tag | Rule::category | Rule::author | Rule::liked => {
                    let name = p.into_inner().as_str();
                    match rule {
                        Rule::tag => Ok(Query::Tag(name.to_string())),
                        Rule::category => db
                            .category_id(name)
                            .map(Query::Category)
                            .ok_or_else(|| Error::Validation(format!("unknown category {name:?}"))),
                        Rule::author => db
                            .user_id(name)
                            .map(Query::Author)
                            .ok_or_else(|| Error::Validation(format!("unknown user {name:?}"))),
                        _ => db
                            .user_id(name)
                            .map(Query::LikedBy)
                            .ok_or_else(|| Error::Validation(format!("unknown user {name:?}"))),
                    }
                }
                r => unreachable!("search unexpected primary: {:?}", r),
            }
        })
        .map_infix(|lhs, op, rhs| {
            let (lhs, rhs) = (lhs?, rhs?);
            Ok(match op.as_rule() {
                Rule::and | Rule::implicit_and => match lhs {
                    Query::All(mut v) if !v.is_empty() => {
                        v.push(rhs);
                        Query::All(v)
                    }
                    _ => Query::All(vec![lhs, rhs]),
                },
                Rule::or => match lhs {
                    Query::Any(mut v) if !v.is_empty() => {
                        v.push(rhs);
                        Query::Any(v)
                    }
                    _ => Query::Any(vec![lhs, rhs]),
                },
                r => unreachable!("search unexpected infix: {:?}", r),
            })
        })
        .map_prefix(|op, rhs| match op.as_rule() {
            Rule::not => Ok(Query::Not(Box::new(rhs?))),
            r => unreachable!("search unexpected prefix: {:?}", r),
        })
        .parse(pairs)
}

// The grammar guarantees the surrounding quotes and that no backslash is terminal
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut res = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => res.extend(chars.next()),
            c => res.push(c),
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Category, CategoryId, User, UserId, Uuid};

    const ALICE: UserId = UserId(Uuid::from_u128(1));
    const TRAVEL: CategoryId = CategoryId(Uuid::from_u128(2));

    fn example_db() -> DbDump {
        let mut db = DbDump::stub();
        db.add_users(vec![User::new(ALICE, String::from("alice"))]);
        db.add_categories(vec![Category {
            id: TRAVEL,
            name: String::from("travel"),
        }]);
        db
    }

    fn parse(s: &str) -> Result<Query, Error> {
        parse_search(&example_db(), s)
    }

    fn phrase(s: &str) -> Query {
        Query::Phrase(String::from(s))
    }

    #[test]
    fn empty_matches_everything() {
        assert_eq!(parse(""), Ok(Query::everything()));
        assert_eq!(parse("   "), Ok(Query::everything()));
    }

    #[test]
    fn words_and_phrases() {
        assert_eq!(parse("lisbon"), Ok(phrase("lisbon")));
        assert_eq!(parse(r#""a \"quoted\" \\ phrase""#), Ok(phrase(r#"a "quoted" \ phrase"#)));
        assert_eq!(
            parse("lisbon porto"),
            Ok(Query::All(vec![phrase("lisbon"), phrase("porto")]))
        );
        // keywords only count as such when standing alone
        assert_eq!(
            parse("android notes"),
            Ok(Query::All(vec![phrase("android"), phrase("notes")]))
        );
    }

    #[test]
    fn names_are_resolved() {
        assert_eq!(
            parse("tag:food category:travel author:alice liked:alice"),
            Ok(Query::All(vec![
                Query::Tag(String::from("food")),
                Query::Category(TRAVEL),
                Query::Author(ALICE),
                Query::LikedBy(ALICE),
            ]))
        );
        assert!(matches!(parse("author:bob"), Err(Error::Validation(_))));
        assert!(matches!(parse("category:food"), Err(Error::Validation(_))));
    }

    #[test]
    fn or_binds_loosest() {
        assert_eq!(
            parse("a b OR c and d or e"),
            Ok(Query::Any(vec![
                Query::All(vec![phrase("a"), phrase("b")]),
                Query::All(vec![phrase("c"), phrase("d")]),
                phrase("e"),
            ]))
        );
    }

    #[test]
    fn negation_and_parentheses() {
        assert_eq!(
            parse("-tag:food not (a or b)"),
            Ok(Query::All(vec![
                Query::Not(Box::new(Query::Tag(String::from("food")))),
                Query::Not(Box::new(Query::Any(vec![phrase("a"), phrase("b")]))),
            ]))
        );
        assert_eq!(parse("()"), Ok(Query::everything()));
    }

    #[test]
    fn phrases_are_validated() {
        let across = format!("title{}description", crate::api::FIELD_SEPARATOR);
        assert!(matches!(parse(&across), Err(Error::Validation(_))));
        assert!(matches!(parse("a\0b"), Err(Error::NullByteInString(_))));
    }

    #[test]
    fn syntax_errors() {
        for s in [r#""unclosed"#, "(a", "a)", "-"] {
            assert!(matches!(parse(s), Err(Error::Validation(_))), "{s}");
        }
    }
}

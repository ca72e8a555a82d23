//! Prints SQL filling a condun database with random users, posts and comments
//!
//! Every user can log in with the password `password`.

use chrono::{Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use uuid::Uuid;

const NUM_USERS: usize = 5;
const NUM_CATEGORIES: usize = 4;
const CATEGORY_NAMES: [&str; NUM_CATEGORIES] = ["travel", "food", "hiking", "city-guides"];
const TAGS: [&str; 8] = [
    "budget", "family", "weekend", "winter", "summer", "vegan", "museums", "beaches",
];

const NUM_POSTS: usize = 40;
const SEGMENTS_PER_POST: usize = 4;
const ITEMS_PER_SEGMENT: usize = 3;
const POST_TITLE_WORDS: usize = 5;
const POST_DESCRIPTION_WORDS: usize = 30;

const NUM_COMMENTS: usize = 400;
const COMMENT_WORDS: usize = 25;
const REPLY_PROBABILITY: f64 = 0.6;
const DELETE_PROBABILITY: f64 = 0.05;

const NUM_VOTES: usize = 800;
const NUM_LIKES: usize = 120;

fn gen_n_items(table: &str, n: usize, mut f: impl FnMut(usize) -> String) {
    if n == 0 {
        return;
    }
    println!("INSERT INTO {} VALUES", table);
    for i in 0..n {
        if i != 0 {
            println!(",");
        }
        print!("    {}", f(i));
    }
    println!();
    println!("ON CONFLICT DO NOTHING;");
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn sentence(words: usize) -> String {
    quote(lipsum::lipsum_words(words).trim_end_matches('.'))
}

fn main() {
    let mut rng = rand::thread_rng();
    let start = Utc::now() - Duration::days(60);
    let password_hash = bcrypt::hash("password", 4).expect("hashing the test password");

    let users = (0..NUM_USERS).map(|_| Uuid::new_v4()).collect::<Vec<_>>();
    gen_n_items(
        "users (id, name, password_hash, avatar_image_id, avatar_blur_data_url)",
        NUM_USERS,
        |i| {
            format!(
                "('{}', 'user{i}', {}, 'avatar-{i}', 'data:image/png;base64,AAAA')",
                users[i],
                quote(&password_hash),
            )
        },
    );
    gen_n_items(
        "donation_links (user_id, position, kind, address)",
        NUM_USERS,
        |i| format!("('{}', 0, 'paypal', 'user{i}@example.org')", users[i]),
    );

    let categories = (0..NUM_CATEGORIES)
        .map(|_| Uuid::new_v4())
        .collect::<Vec<_>>();
    gen_n_items("categories (id, name)", NUM_CATEGORIES, |i| {
        format!("('{}', '{}')", categories[i], CATEGORY_NAMES[i])
    });

    let mut posts = Vec::new();
    gen_n_items(
        "posts (id, author_id, category_id, title, description, view_count, created_at)",
        NUM_POSTS,
        |_| {
            let id = Uuid::new_v4();
            let created_at = start + Duration::minutes(rng.gen_range(0..60 * 24 * 30));
            posts.push((id, created_at));
            format!(
                "('{id}', '{}', '{}', {}, {}, {}, '{}')",
                users.choose(&mut rng).expect("there are users"),
                categories.choose(&mut rng).expect("there are categories"),
                sentence(POST_TITLE_WORDS),
                sentence(POST_DESCRIPTION_WORDS),
                rng.gen_range(0..1000),
                created_at.to_rfc3339(),
            )
        },
    );

    let mut post_tags = Vec::new();
    for (post, _) in posts.iter() {
        for tag in TAGS.choose_multiple(&mut rng, 2) {
            post_tags.push(format!("('{post}', '{tag}')"));
        }
    }
    gen_n_items("post_tags (post_id, tag)", post_tags.len(), |i| {
        post_tags[i].clone()
    });

    let mut segments = Vec::new();
    gen_n_items(
        "post_segments (id, post_id, position, title, subtitle)",
        NUM_POSTS * SEGMENTS_PER_POST,
        |i| {
            let id = Uuid::new_v4();
            segments.push(id);
            format!(
                "('{id}', '{}', {}, 'Day {}', {})",
                posts[i / SEGMENTS_PER_POST].0,
                i % SEGMENTS_PER_POST,
                i % SEGMENTS_PER_POST + 1,
                sentence(3),
            )
        },
    );
    gen_n_items(
        "post_segment_items (id, segment_id, position, title, description)",
        segments.len() * ITEMS_PER_SEGMENT,
        |i| {
            format!(
                "('{}', '{}', {}, {}, {})",
                Uuid::new_v4(),
                segments[i / ITEMS_PER_SEGMENT],
                i % ITEMS_PER_SEGMENT,
                sentence(2),
                sentence(12),
            )
        },
    );

    // likes and votes may be generated twice, ON CONFLICT DO NOTHING deduplicates them
    gen_n_items("post_likes (post_id, user_id)", NUM_LIKES, |_| {
        format!(
            "('{}', '{}')",
            posts.choose(&mut rng).expect("there are posts").0,
            users.choose(&mut rng).expect("there are users"),
        )
    });

    // (id, post index), parents are always generated before their replies
    let mut comments: Vec<(Uuid, usize)> = Vec::new();
    gen_n_items(
        "comments (id, post_id, parent_id, author_id, text, is_deleted, created_at)",
        NUM_COMMENTS,
        |i| {
            let id = Uuid::new_v4();
            let post = rng.gen_range(0..posts.len());
            let parent = match rng.gen_bool(REPLY_PROBABILITY) {
                true => comments
                    .iter()
                    .filter(|(_, p)| *p == post)
                    .map(|(c, _)| *c)
                    .collect::<Vec<_>>()
                    .choose(&mut rng)
                    .map(|c| format!("'{c}'")),
                false => None,
            };
            comments.push((id, post));
            let is_deleted = rng.gen_bool(DELETE_PROBABILITY);
            format!(
                "('{id}', '{}', {}, '{}', {}, {is_deleted}, '{}')",
                posts[post].0,
                parent.unwrap_or_else(|| String::from("NULL")),
                users.choose(&mut rng).expect("there are users"),
                match is_deleted {
                    true => String::from("''"),
                    false => sentence(COMMENT_WORDS),
                },
                (posts[post].1 + Duration::minutes(i as i64)).to_rfc3339(),
            )
        },
    );
    gen_n_items(
        "comment_votes (comment_id, user_id, is_upvote)",
        NUM_VOTES,
        |_| {
            format!(
                "('{}', '{}', {})",
                comments.choose(&mut rng).expect("there are comments").0,
                users.choose(&mut rng).expect("there are users"),
                rng.gen_bool(0.8),
            )
        },
    );
}

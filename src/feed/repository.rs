use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::approval::ApprovalState;
use crate::dates;
use crate::db::{immediate, rows, with_conn, StoreError};
use crate::events::EventDetails;
use crate::feed::domain::{Comment, Post, PostDraft, PostType};
use crate::ids::{CommentId, PostId, UserId};
use crate::state::DbPool;

#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Post row and survey questions in one transaction
    async fn insert_post(&self, draft: &PostDraft) -> Result<(), StoreError>;

    async fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError>;

    /// Published, not soft-deleted, by a live author
    async fn visible_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    /// Newest first
    async fn public_feed(&self, limit: u32) -> Result<Vec<Post>, StoreError>;

    /// Oldest first, live comments by live authors
    async fn comments(&self, post_id: &str) -> Result<Vec<Comment>, StoreError>;
}

pub type DynFeedRepository = Arc<dyn FeedRepository>;

pub struct SqliteFeedRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteFeedRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

const VISIBLE_POSTS: &str =
    "SELECT p.id, p.user_id, p.post_type, p.title, p.body, p.approval_status,
            p.event_date, p.registration_deadline, p.max_participants, p.created_at
     FROM posts p
     JOIN users u ON u.id = p.user_id
     WHERE p.approval_status = 'published'
       AND p.deleted_at IS NULL
       AND u.deleted_at IS NULL";

struct RawPost {
    id: String,
    user_id: String,
    post_type: String,
    title: Option<String>,
    body: String,
    approval: String,
    event_date: Option<String>,
    deadline: Option<String>,
    max_participants: Option<u32>,
    created_at: String,
}

fn read_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPost> {
    Ok(RawPost {
        id: row.get(0)?,
        user_id: row.get(1)?,
        post_type: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        approval: row.get(5)?,
        event_date: row.get(6)?,
        deadline: row.get(7)?,
        max_participants: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl RawPost {
    fn into_post(self) -> Result<Post, StoreError> {
        let post_type = rows::parse_enum("post_type", &self.post_type, PostType::parse)?;
        let event = if post_type == PostType::Event {
            Some(EventDetails {
                event_date: rows::parse_optional_date("event_date", self.event_date)?,
                registration_deadline: rows::parse_optional_date(
                    "registration_deadline",
                    self.deadline,
                )?,
                max_participants: self.max_participants,
            })
        } else {
            None
        };

        Ok(Post {
            id: PostId::new(self.id),
            author_id: UserId::new(self.user_id),
            post_type,
            title: self.title,
            body: self.body,
            approval: rows::parse_enum("approval_status", &self.approval, ApprovalState::parse)?,
            event,
            created_at: rows::parse_timestamp("created_at", &self.created_at)?,
        })
    }
}

#[async_trait]
impl FeedRepository for SqliteFeedRepository {
    async fn insert_post(&self, draft: &PostDraft) -> Result<(), StoreError> {
        let draft = draft.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            immediate(conn, |tx| {
                let post = &draft.post;
                let event = post.event.unwrap_or_default();
                tx.execute(
                    "INSERT INTO posts (id, user_id, post_type, title, body, approval_status,
                                        event_date, registration_deadline, max_participants, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        post.id.as_str(),
                        post.author_id.as_str(),
                        post.post_type.as_str(),
                        post.title,
                        post.body,
                        post.approval.as_str(),
                        event.event_date.map(dates::to_storage),
                        event.registration_deadline.map(dates::to_storage),
                        event.max_participants,
                        rows::timestamp(post.created_at)
                    ],
                )?;

                for question in &draft.questions {
                    tx.execute(
                        "INSERT INTO survey_questions (post_id, question_index, question_json)
                         VALUES (?1, ?2, ?3)",
                        params![
                            post.id.as_str(),
                            question.index,
                            serde_json::to_string(question)?
                        ],
                    )?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        let c = comment.clone();
        with_conn(&self.pool, self.timeout, move |conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, user_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.id.as_str(),
                    c.post_id.as_str(),
                    c.author_id.as_str(),
                    c.body,
                    rows::timestamp(c.created_at)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn visible_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let id = id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!("{} AND p.id = ?1", VISIBLE_POSTS);
            let raw = conn.query_row(&sql, params![id], read_post).optional()?;
            raw.map(RawPost::into_post).transpose()
        })
        .await
    }

    async fn public_feed(&self, limit: u32) -> Result<Vec<Post>, StoreError> {
        with_conn(&self.pool, self.timeout, move |conn| {
            let sql = format!("{} ORDER BY p.created_at DESC, p.id DESC LIMIT ?1", VISIBLE_POSTS);
            let mut stmt = conn.prepare(&sql)?;
            let raws = stmt
                .query_map(params![limit], read_post)?
                .collect::<Result<Vec<_>, _>>()?;
            raws.into_iter().map(RawPost::into_post).collect()
        })
        .await
    }

    async fn comments(&self, post_id: &str) -> Result<Vec<Comment>, StoreError> {
        let post_id = post_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.user_id, c.body, c.created_at
                 FROM comments c
                 JOIN users u ON u.id = c.user_id
                 WHERE c.post_id = ?1 AND c.deleted_at IS NULL AND u.deleted_at IS NULL
                 ORDER BY c.created_at, c.id",
            )?;
            let raws = stmt
                .query_map(params![post_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raws.into_iter()
                .map(|(id, post_id, user_id, body, created_at)| {
                    Ok::<_, StoreError>(Comment {
                        id: CommentId::new(id),
                        post_id: PostId::new(post_id),
                        author_id: UserId::new(user_id),
                        body,
                        created_at: rows::parse_timestamp("created_at", &created_at)?,
                    })
                })
                .collect()
        })
        .await
    }
}

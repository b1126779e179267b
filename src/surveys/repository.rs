use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{rows, with_conn, StoreError};
use crate::ids::UserId;
use crate::state::DbPool;
use crate::surveys::domain::{SurveyAnswer, SurveyQuestion, SurveyResponse};

/// A visible survey post and its questions
#[derive(Debug, Clone)]
pub struct SurveyDefinition {
    pub post_id: String,
    pub owner_id: UserId,
    pub questions: Vec<SurveyQuestion>,
}

#[async_trait]
pub trait SurveyRepository: Send + Sync {
    /// None unless the post is a published, live survey
    async fn load(&self, post_id: &str) -> Result<Option<SurveyDefinition>, StoreError>;

    /// Insert or overwrite the answer for (post, user, question)
    async fn upsert_answer(
        &self,
        post_id: &str,
        user_id: &UserId,
        question_index: u32,
        answer: &SurveyAnswer,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn responses(&self, post_id: &str) -> Result<Vec<SurveyResponse>, StoreError>;
}

pub type DynSurveyRepository = Arc<dyn SurveyRepository>;

pub struct SqliteSurveyRepository {
    pool: DbPool,
    timeout: Duration,
}

impl SqliteSurveyRepository {
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }
}

#[async_trait]
impl SurveyRepository for SqliteSurveyRepository {
    async fn load(&self, post_id: &str) -> Result<Option<SurveyDefinition>, StoreError> {
        let post_id = post_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let owner: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM posts
                     WHERE id = ?1 AND post_type = 'survey'
                       AND approval_status = 'published' AND deleted_at IS NULL",
                    params![post_id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(owner) = owner else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT question_json FROM survey_questions
                 WHERE post_id = ?1 ORDER BY question_index",
            )?;
            let questions = stmt
                .query_map(params![post_id], |row| row.get::<_, String>(0))?
                .map(|json| Ok::<_, StoreError>(serde_json::from_str::<SurveyQuestion>(&json?)?))
                .collect::<Result<Vec<_>, StoreError>>()?;

            Ok(Some(SurveyDefinition {
                post_id,
                owner_id: UserId::new(owner),
                questions,
            }))
        })
        .await
    }

    async fn upsert_answer(
        &self,
        post_id: &str,
        user_id: &UserId,
        question_index: u32,
        answer: &SurveyAnswer,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let post_id = post_id.to_string();
        let user_id = user_id.clone();
        let answer_json = serde_json::to_string(answer)?;
        with_conn(&self.pool, self.timeout, move |conn| {
            conn.execute(
                "INSERT INTO survey_responses (post_id, user_id, question_index, answer_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(post_id, user_id, question_index) DO UPDATE SET
                   answer_json = excluded.answer_json,
                   updated_at = excluded.updated_at",
                params![
                    post_id,
                    user_id.as_str(),
                    question_index,
                    answer_json,
                    rows::timestamp(now)
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn responses(&self, post_id: &str) -> Result<Vec<SurveyResponse>, StoreError> {
        let post_id = post_id.to_string();
        with_conn(&self.pool, self.timeout, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, question_index, answer_json FROM survey_responses
                 WHERE post_id = ?1",
            )?;
            let raws = stmt
                .query_map(params![post_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            raws.into_iter()
                .map(|(user_id, question_index, json)| {
                    Ok::<_, StoreError>(SurveyResponse {
                        user_id: UserId::new(user_id),
                        question_index,
                        answer: serde_json::from_str(&json)?,
                    })
                })
                .collect()
        })
        .await
    }
}

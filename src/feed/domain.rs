// Post and comment creation rules
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::approval::{submit_for_approval, ApprovalState};
use crate::authority::Actor;
use crate::engine::{EngineError, EngineResult};
use crate::events::{EventDetails, EventDraft};
use crate::ids::{CommentId, PostId, UserId};
use crate::surveys::{define_questions, QuestionDraft, SurveyQuestion};

const MAX_BODY_LEN: usize = 5000;
const MAX_TITLE_LEN: usize = 200;
const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostType {
    General,
    Case,
    Question,
    Event,
    Survey,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Case => "case",
            Self::Question => "question",
            Self::Event => "event",
            Self::Survey => "survey",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(Self::General),
            "case" => Some(Self::Case),
            "question" => Some(Self::Question),
            "event" => Some(Self::Event),
            "survey" => Some(Self::Survey),
            _ => None,
        }
    }

    /// Only events pass through the approval gate
    pub fn requires_approval(&self) -> bool {
        *self == Self::Event
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post as submitted by a client
#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub post_type: PostType,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub event: Option<EventDraft>,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub post_type: PostType,
    pub title: Option<String>,
    pub body: String,
    pub approval: ApprovalState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventDetails>,
    pub created_at: DateTime<Utc>,
}

/// A validated post plus the survey definition stored alongside it
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub post: Post,
    pub questions: Vec<SurveyQuestion>,
}

impl NewPost {
    pub fn validate(self, author: &Actor, now: DateTime<Utc>) -> EngineResult<PostDraft> {
        let body = self.body.trim().to_string();
        if body.is_empty() {
            return Err(EngineError::validation("Post body cannot be empty"));
        }
        if body.chars().count() > MAX_BODY_LEN {
            return Err(EngineError::validation(format!(
                "Post body must be {} characters or less",
                MAX_BODY_LEN
            )));
        }

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(t) = &title {
            if t.chars().count() > MAX_TITLE_LEN {
                return Err(EngineError::validation(format!(
                    "Title must be {} characters or less",
                    MAX_TITLE_LEN
                )));
            }
        }

        let event = match (self.post_type, self.event) {
            (PostType::Event, Some(draft)) => Some(draft.validate()?),
            (PostType::Event, None) => {
                return Err(EngineError::validation("Event posts need an event date"));
            }
            (_, Some(_)) => {
                return Err(EngineError::validation(
                    "Only event posts carry event details",
                ));
            }
            (_, None) => None,
        };

        let questions = match self.post_type {
            PostType::Survey => define_questions(self.questions)?,
            _ if !self.questions.is_empty() => {
                return Err(EngineError::validation("Only survey posts carry questions"));
            }
            _ => Vec::new(),
        };

        Ok(PostDraft {
            post: Post {
                id: PostId::generate(),
                author_id: author.id.clone(),
                post_type: self.post_type,
                title,
                body,
                approval: submit_for_approval(self.post_type),
                event,
                created_at: now,
            },
            questions,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(post_id: PostId, author: &Actor, body: &str, now: DateTime<Utc>) -> EngineResult<Self> {
        let body = body.trim();
        if body.is_empty() {
            return Err(EngineError::validation("Comment cannot be empty"));
        }
        if body.chars().count() > MAX_COMMENT_LEN {
            return Err(EngineError::validation(format!(
                "Comment must be {} characters or less",
                MAX_COMMENT_LEN
            )));
        }
        Ok(Self {
            id: CommentId::generate(),
            post_id,
            author_id: author.id.clone(),
            body: body.to_string(),
            created_at: now,
        })
    }
}

pub mod domain;
pub mod repository;

pub use domain::{Comment, NewPost, Post, PostDraft, PostType};
pub use repository::{DynFeedRepository, FeedRepository, SqliteFeedRepository};

use chrono::{DateTime, Utc};

use crate::authority::{Actor, Capability, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult};

pub const MAX_FEED_PAGE: u32 = 100;

/// Post and comment creation plus the public read paths
pub struct Feed {
    repo: DynFeedRepository,
}

impl Feed {
    pub fn new(repo: DynFeedRepository) -> Self {
        Self { repo }
    }

    pub async fn create_post(
        &self,
        actor: &Actor,
        post: NewPost,
        now: DateTime<Utc>,
    ) -> EngineResult<Post> {
        RoleAuthority::require(actor, &actor.own_account(), Capability::Participate)?;
        let draft = post.validate(actor, now)?;
        self.repo.insert_post(&draft).await?;

        tracing::info!(
            post_id = %draft.post.id,
            post_type = %draft.post.post_type,
            approval = %draft.post.approval,
            author = %actor.id,
            "Post created"
        );
        Ok(draft.post)
    }

    pub async fn create_comment(
        &self,
        actor: &Actor,
        post_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Comment> {
        let post = self.post(post_id).await?;
        RoleAuthority::require(
            actor,
            &Target::Post {
                owner: &post.author_id,
            },
            Capability::Participate,
        )?;

        let comment = Comment::new(post.id, actor, body, now)?;
        self.repo.insert_comment(&comment).await?;

        tracing::info!(post_id, comment_id = %comment.id, author = %actor.id, "Comment created");
        Ok(comment)
    }

    pub async fn public_feed(&self, limit: u32) -> EngineResult<Vec<Post>> {
        Ok(self.repo.public_feed(limit.clamp(1, MAX_FEED_PAGE)).await?)
    }

    /// A single visible post; hidden and deleted posts are not found
    pub async fn post(&self, post_id: &str) -> EngineResult<Post> {
        self.repo
            .visible_post(post_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("post {}", post_id)))
    }

    pub async fn comments(&self, post_id: &str) -> EngineResult<Vec<Comment>> {
        let post = self.post(post_id).await?;
        Ok(self.repo.comments(post.id.as_str()).await?)
    }
}

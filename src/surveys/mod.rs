pub mod domain;
pub mod repository;

pub use domain::{
    define_questions, QuestionDraft, QuestionKind, SurveyAnswer, SurveyQuestion, SurveyResponse,
    SurveyTally,
};
pub use repository::{DynSurveyRepository, SqliteSurveyRepository, SurveyDefinition, SurveyRepository};

use chrono::{DateTime, Utc};

use crate::authority::{Actor, Capability, RoleAuthority, Target};
use crate::engine::{EngineError, EngineResult};

/// Response capture and result tallies for survey posts
pub struct SurveyAggregator {
    repo: DynSurveyRepository,
}

impl SurveyAggregator {
    pub fn new(repo: DynSurveyRepository) -> Self {
        Self { repo }
    }

    async fn load(&self, post_id: &str) -> EngineResult<SurveyDefinition> {
        self.repo
            .load(post_id)
            .await?
            .ok_or_else(|| EngineError::not_found(format!("survey {}", post_id)))
    }

    pub async fn submit_answer(
        &self,
        actor: &Actor,
        post_id: &str,
        question_index: u32,
        answer: SurveyAnswer,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let survey = self.load(post_id).await?;
        RoleAuthority::require(
            actor,
            &Target::Post {
                owner: &survey.owner_id,
            },
            Capability::Participate,
        )?;

        let question = survey
            .questions
            .iter()
            .find(|q| q.index == question_index)
            .ok_or_else(|| {
                EngineError::validation(format!("Unknown question index {}", question_index))
            })?;
        let answer = question.validate(answer)?;

        self.repo
            .upsert_answer(post_id, &actor.id, question_index, &answer, now)
            .await?;

        tracing::info!(post_id, question_index, user = %actor.id, "Survey answer recorded");
        Ok(())
    }

    pub async fn aggregate(&self, post_id: &str) -> EngineResult<SurveyTally> {
        let survey = self.load(post_id).await?;
        let responses = self.repo.responses(post_id).await?;
        Ok(domain::tally(post_id, &survey.questions, &responses))
    }
}

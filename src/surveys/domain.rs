// Survey definitions, answer validation and the pure tally projection
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::engine::{EngineError, EngineResult};
use crate::ids::UserId;

pub const MAX_QUESTIONS: usize = 20;
const MAX_OPTIONS: usize = 20;
const MAX_PROMPT_LEN: usize = 500;
const MAX_TEXT_ANSWER_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice { options: Vec<String> },
    MultipleChoice { options: Vec<String> },
    Rating,
    Text,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleChoice { .. } => "single_choice",
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::Rating => "rating",
            Self::Text => "text",
        }
    }
}

/// A question as submitted with a new survey post; the index is assigned
/// from its position.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDraft {
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyQuestion {
    pub index: u32,
    pub prompt: String,
    pub kind: QuestionKind,
    pub required: bool,
}

/// Validate and number the questions of a new survey
pub fn define_questions(drafts: Vec<QuestionDraft>) -> EngineResult<Vec<SurveyQuestion>> {
    if drafts.is_empty() || drafts.len() > MAX_QUESTIONS {
        return Err(EngineError::validation(format!(
            "A survey needs between 1 and {} questions",
            MAX_QUESTIONS
        )));
    }

    drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| define_question(i as u32, draft))
        .collect()
}

fn define_question(index: u32, draft: QuestionDraft) -> EngineResult<SurveyQuestion> {
    let prompt = draft.prompt.trim().to_string();
    if prompt.is_empty() {
        return Err(EngineError::validation(format!(
            "Question {} has an empty prompt",
            index + 1
        )));
    }
    if prompt.chars().count() > MAX_PROMPT_LEN {
        return Err(EngineError::validation(format!(
            "Question {} prompt must be {} characters or less",
            index + 1,
            MAX_PROMPT_LEN
        )));
    }

    let kind = match draft.kind {
        QuestionKind::SingleChoice { options } => QuestionKind::SingleChoice {
            options: normalize_options(index, options)?,
        },
        QuestionKind::MultipleChoice { options } => QuestionKind::MultipleChoice {
            options: normalize_options(index, options)?,
        },
        other => other,
    };

    Ok(SurveyQuestion {
        index,
        prompt,
        kind,
        required: draft.required,
    })
}

fn normalize_options(index: u32, options: Vec<String>) -> EngineResult<Vec<String>> {
    let options: Vec<String> = options.into_iter().map(|o| o.trim().to_string()).collect();

    if options.iter().any(|o| o.is_empty()) {
        return Err(EngineError::validation(format!(
            "Question {} has an empty option",
            index + 1
        )));
    }
    let distinct: HashSet<&str> = options.iter().map(String::as_str).collect();
    if distinct.len() != options.len() {
        return Err(EngineError::validation(format!(
            "Question {} has duplicate options",
            index + 1
        )));
    }
    if options.len() < 2 || options.len() > MAX_OPTIONS {
        return Err(EngineError::validation(format!(
            "Question {} needs between 2 and {} options",
            index + 1,
            MAX_OPTIONS
        )));
    }
    Ok(options)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SurveyAnswer {
    Options(Vec<String>),
    Rating(u8),
    Text(String),
}

impl SurveyQuestion {
    /// Check `answer` against this question and return its normalized form.
    /// Empty answers are rejected whether or not the question is required:
    /// skipping a question means not submitting it.
    pub fn validate(&self, answer: SurveyAnswer) -> EngineResult<SurveyAnswer> {
        match (&self.kind, answer) {
            (QuestionKind::SingleChoice { options }, SurveyAnswer::Options(selected)) => {
                let selected = check_selection(options, selected)?;
                if selected.len() != 1 {
                    return Err(EngineError::validation("Select exactly one option"));
                }
                Ok(SurveyAnswer::Options(selected))
            }
            (QuestionKind::MultipleChoice { options }, SurveyAnswer::Options(selected)) => {
                Ok(SurveyAnswer::Options(check_selection(options, selected)?))
            }
            (QuestionKind::Rating, SurveyAnswer::Rating(value)) => {
                if !(1..=5).contains(&value) {
                    return Err(EngineError::validation("Rating must be between 1 and 5"));
                }
                Ok(SurveyAnswer::Rating(value))
            }
            (QuestionKind::Text, SurveyAnswer::Text(text)) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(EngineError::validation("Answer cannot be empty"));
                }
                if text.chars().count() > MAX_TEXT_ANSWER_LEN {
                    return Err(EngineError::validation(format!(
                        "Answer must be {} characters or less",
                        MAX_TEXT_ANSWER_LEN
                    )));
                }
                Ok(SurveyAnswer::Text(text))
            }
            (kind, _) => Err(EngineError::validation(format!(
                "Answer does not match a {} question",
                kind.as_str()
            ))),
        }
    }
}

fn check_selection(options: &[String], selected: Vec<String>) -> EngineResult<Vec<String>> {
    if selected.is_empty() {
        return Err(EngineError::validation("Select at least one option"));
    }

    let mut seen = HashSet::new();
    for choice in &selected {
        if !options.contains(choice) {
            return Err(EngineError::validation(format!("Unknown option: {:?}", choice)));
        }
        if !seen.insert(choice.as_str()) {
            return Err(EngineError::validation(format!("Option selected twice: {:?}", choice)));
        }
    }
    Ok(selected)
}

/// One stored answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub user_id: UserId,
    pub question_index: u32,
    pub answer: SurveyAnswer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionTally {
    pub label: String,
    pub count: u32,
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionTally {
    pub index: u32,
    pub prompt: String,
    pub kind: &'static str,
    pub responses: u32,
    pub options: Vec<OptionTally>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyTally {
    pub post_id: String,
    pub respondents: u32,
    pub questions: Vec<QuestionTally>,
}

/// `round(count * 100 / responses)`, half away from zero; 0 without responses
pub fn percentage(count: u32, responses: u32) -> u32 {
    if responses == 0 {
        return 0;
    }
    (f64::from(count) * 100.0 / f64::from(responses)).round() as u32
}

const RATING_LABELS: [&str; 5] = ["1", "2", "3", "4", "5"];

/// Project stored responses onto the survey definition
pub fn tally(post_id: &str, questions: &[SurveyQuestion], responses: &[SurveyResponse]) -> SurveyTally {
    let respondents = responses
        .iter()
        .map(|r| &r.user_id)
        .collect::<HashSet<_>>()
        .len() as u32;

    let questions = questions
        .iter()
        .map(|q| {
            let answers: Vec<&SurveyAnswer> = responses
                .iter()
                .filter(|r| r.question_index == q.index)
                .map(|r| &r.answer)
                .collect();
            tally_question(q, &answers)
        })
        .collect();

    SurveyTally {
        post_id: post_id.to_string(),
        respondents,
        questions,
    }
}

fn tally_question(question: &SurveyQuestion, answers: &[&SurveyAnswer]) -> QuestionTally {
    let responses = answers.len() as u32;

    let labels: Vec<String> = match &question.kind {
        QuestionKind::SingleChoice { options } | QuestionKind::MultipleChoice { options } => {
            options.clone()
        }
        QuestionKind::Rating => RATING_LABELS.iter().map(|l| l.to_string()).collect(),
        QuestionKind::Text => Vec::new(),
    };

    let options = labels
        .into_iter()
        .map(|label| {
            let count = answers.iter().filter(|a| answer_selects(a, &label)).count() as u32;
            OptionTally {
                percentage: percentage(count, responses),
                label,
                count,
            }
        })
        .collect();

    let average = match question.kind {
        QuestionKind::Rating => {
            let ratings: Vec<f64> = answers
                .iter()
                .filter_map(|a| match a {
                    SurveyAnswer::Rating(v) => Some(f64::from(*v)),
                    _ => None,
                })
                .collect();
            if ratings.is_empty() {
                None
            } else {
                let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
                Some((mean * 100.0).round() / 100.0)
            }
        }
        _ => None,
    };

    QuestionTally {
        index: question.index,
        prompt: question.prompt.clone(),
        kind: question.kind.as_str(),
        responses,
        options,
        average,
    }
}

fn answer_selects(answer: &SurveyAnswer, label: &str) -> bool {
    match answer {
        SurveyAnswer::Options(selected) => selected.iter().any(|s| s == label),
        SurveyAnswer::Rating(v) => v.to_string() == label,
        SurveyAnswer::Text(_) => false,
    }
}

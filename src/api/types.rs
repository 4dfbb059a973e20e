//! Request and response types for the Fluency API.

use crate::content::{ModuleContent, ModuleMeta};
use crate::prompts::FeedbackFields;
use crate::upstream::ChatMessage;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}

/// Body of `POST /api/ai-feedback`.
///
/// `type` is kept as a string so an unknown kind is a 400, not a parse error.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub module_title: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub user_input: String,
}

impl FeedbackRequest {
    pub fn fields(&self) -> FeedbackFields<'_> {
        FeedbackFields {
            prompt: self.prompt.as_deref().unwrap_or_default(),
            title: self.title.as_deref().unwrap_or_default(),
            solution: self.solution.as_deref().unwrap_or_default(),
            question: self.question.as_deref().unwrap_or_default(),
            answer: self.answer.as_deref().unwrap_or_default(),
            questions: &self.questions,
        }
    }
}

/// Body of `POST /api/module-chat`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleChatRequest {
    #[serde(default)]
    pub module_title: String,
    #[serde(default)]
    pub level_title: String,
    #[serde(default)]
    pub course_name: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ModuleResponse {
    pub module: ModuleContent,
    pub prev: Option<ModuleMeta>,
    pub next: Option<ModuleMeta>,
}

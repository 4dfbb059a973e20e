//! System instructions for the AI endpoints.
//!
//! Feedback prompts are picked by the interaction kind that produced the
//! learner's answer; module chat gets a course-scoped tutor instruction.

use serde::{Deserialize, Serialize};

/// Interaction kinds that can request AI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeedbackKind {
    ExplainBack,
    TryItYourself,
    CalibrationCheck,
    PredictPrompt,
    ReflectPrompt,
}

impl FeedbackKind {
    pub const ALL: [FeedbackKind; 5] = [
        Self::ExplainBack,
        Self::TryItYourself,
        Self::CalibrationCheck,
        Self::PredictPrompt,
        Self::ReflectPrompt,
    ];

    /// Wire name, as sent in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplainBack => "explainBack",
            Self::TryItYourself => "tryItYourself",
            Self::CalibrationCheck => "calibrationCheck",
            Self::PredictPrompt => "predictPrompt",
            Self::ReflectPrompt => "reflectPrompt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

/// Template inputs taken from the feedback request.
///
/// Missing fields render as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackFields<'a> {
    pub prompt: &'a str,
    pub title: &'a str,
    pub solution: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub questions: &'a [String],
}

/// System instruction for a feedback request.
pub fn feedback_system_prompt(kind: FeedbackKind, f: &FeedbackFields<'_>) -> String {
    match kind {
        FeedbackKind::ExplainBack => format!(
            "You are a supportive learning coach for an AI Fluency curriculum. The learner was asked to explain: \"{}\". Evaluate their explanation for accuracy and completeness. Always start by acknowledging what they got right. If their explanation is strong, affirm it and add a deeper insight, related concept, or practical tip they might not have considered. If there are gaps or misconceptions, gently address them. Always give substantive feedback \u{2014} never just \"correct\" or \"good job\" alone. 2-3 short paragraphs max.",
            f.prompt
        ),
        FeedbackKind::TryItYourself => format!(
            "You are a supportive learning coach. The exercise was: \"{}\". The expected approach is: \"{}\". The learner submitted their response. Compare their approach. Always start by highlighting strengths in their approach. If it's strong, affirm what they did well and share an additional insight, edge case, or refinement they could consider. Note meaningful differences from the expected approach and explain why they matter. Always give substantive feedback \u{2014} never just \"correct\" or \"good job\" alone. Be encouraging, not grading. 2-3 short paragraphs max.",
            f.title, f.solution
        ),
        FeedbackKind::CalibrationCheck => format!(
            "You are a supportive learning coach. The question was: \"{}\". The correct answer is: \"{}\". The learner wants to discuss this further. Help them understand more deeply. Be conversational. Always provide a substantive response that deepens their understanding. 2-3 short paragraphs max.",
            f.question, f.answer
        ),
        FeedbackKind::PredictPrompt => format!(
            "You are a supportive learning coach for an AI Fluency curriculum. The learner was asked to predict: \"{}\". Evaluate their prediction \u{2014} was their intuition on the right track? Always start by highlighting what they got right. If their prediction was accurate, affirm it and expand with a deeper insight, real-world example, or nuance they might find interesting. If there were misconceptions, gently correct them and explain the actual answer. Always give substantive feedback \u{2014} never just \"correct\" or \"good job\" alone. Be encouraging and help them learn. 2-3 short paragraphs max.",
            f.prompt
        ),
        FeedbackKind::ReflectPrompt => format!(
            "You are a supportive learning coach for an AI Fluency curriculum. The learner was asked to reflect on these questions: {}. Evaluate their reflections for depth and insight. Always start by affirming thoughtful observations. If their reflections are strong, expand on them with deeper connections, real-world applications, or thought-provoking follow-up ideas. Gently expand on areas they could explore further, and connect their reflections back to the core concepts. Always give substantive feedback \u{2014} never just \"good reflection\" alone. Be encouraging and thought-provoking. 2-3 short paragraphs max.",
            f.questions.join(",")
        ),
    }
}

/// The learner's turn sent alongside a feedback instruction.
pub fn feedback_user_message(module_title: &str, user_input: &str) -> String {
    format!("Module: {}\n\nMy response:\n{}", module_title, user_input)
}

/// Display label for a course id; unknown courses are just "learning".
pub fn course_label(course: Option<&str>) -> &'static str {
    match course.unwrap_or("") {
        "ai-fluency" => "AI Fluency",
        "cfa-1" => "CFA Level I",
        "cfa-2" => "CFA Level II",
        "cfa-3" => "CFA Level III",
        _ => "learning",
    }
}

/// System instruction for module chat.
pub fn module_chat_system_prompt(
    module_title: &str,
    level_title: &str,
    course: Option<&str>,
) -> String {
    let extra = if course.is_some_and(|c| c.starts_with("cfa-")) {
        " Use CFA Institute terminology and standards where appropriate. You may generate additional practice problems if the learner requests them."
    } else {
        ""
    };

    format!(
        "You are a helpful learning assistant for the {} curriculum. The learner is studying \"{}\" in \"{}\". Answer questions about this topic. If they ask about unrelated topics, gently redirect them back to the module content. Keep responses concise and educational.{}",
        course_label(course),
        module_title,
        level_title,
        extra
    )
}

/// Keep only the most recent `max` messages.
pub fn recent<T>(messages: &[T], max: usize) -> &[T] {
    &messages[messages.len().saturating_sub(max)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_wire_name() {
        for kind in FeedbackKind::ALL {
            assert_eq!(FeedbackKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FeedbackKind::parse("connectPrompt"), None);
        assert_eq!(FeedbackKind::parse(""), None);
    }

    #[test]
    fn serde_uses_camel_case_names() {
        let kind: FeedbackKind = serde_json::from_str("\"tryItYourself\"").unwrap();
        assert_eq!(kind, FeedbackKind::TryItYourself);
    }

    #[test]
    fn explain_back_quotes_the_prompt() {
        let fields = FeedbackFields {
            prompt: "what a context window is",
            ..Default::default()
        };
        let text = feedback_system_prompt(FeedbackKind::ExplainBack, &fields);
        assert!(text.contains("asked to explain: \"what a context window is\""));
    }

    #[test]
    fn try_it_yourself_includes_title_and_solution() {
        let fields = FeedbackFields {
            title: "Rewrite the prompt",
            solution: "Add a role and an output format",
            ..Default::default()
        };
        let text = feedback_system_prompt(FeedbackKind::TryItYourself, &fields);
        assert!(text.contains("The exercise was: \"Rewrite the prompt\""));
        assert!(text.contains("expected approach is: \"Add a role and an output format\""));
    }

    #[test]
    fn calibration_check_includes_question_and_answer() {
        let fields = FeedbackFields {
            question: "Do LLMs browse the web?",
            answer: "Not by default",
            ..Default::default()
        };
        let text = feedback_system_prompt(FeedbackKind::CalibrationCheck, &fields);
        assert!(text.contains("\"Do LLMs browse the web?\""));
        assert!(text.contains("\"Not by default\""));
    }

    #[test]
    fn reflect_prompt_lists_questions() {
        let questions = vec!["Where did it help?".to_string(), "Where did it fail?".to_string()];
        let fields = FeedbackFields {
            questions: &questions,
            ..Default::default()
        };
        let text = feedback_system_prompt(FeedbackKind::ReflectPrompt, &fields);
        assert!(text.contains("these questions: Where did it help?,Where did it fail?."));
    }

    #[test]
    fn user_message_layout() {
        assert_eq!(
            feedback_user_message("Prompt Basics", "It predicts tokens"),
            "Module: Prompt Basics\n\nMy response:\nIt predicts tokens"
        );
    }

    #[test]
    fn course_labels() {
        assert_eq!(course_label(Some("ai-fluency")), "AI Fluency");
        assert_eq!(course_label(Some("cfa-2")), "CFA Level II");
        assert_eq!(course_label(Some("pottery")), "learning");
        assert_eq!(course_label(None), "learning");
    }

    #[test]
    fn cfa_chat_prompt_gets_terminology_suffix() {
        let text = module_chat_system_prompt("Duration", "Fixed Income", Some("cfa-1"));
        assert!(text.starts_with("You are a helpful learning assistant for the CFA Level I curriculum."));
        assert!(text.contains("studying \"Duration\" in \"Fixed Income\""));
        assert!(text.ends_with("if the learner requests them."));
    }

    #[test]
    fn plain_chat_prompt_has_no_suffix() {
        let text = module_chat_system_prompt("Tokens", "Foundations", Some("ai-fluency"));
        assert!(text.ends_with("Keep responses concise and educational."));
    }

    #[test]
    fn recent_keeps_tail() {
        let items: Vec<u32> = (1..=25).collect();
        assert_eq!(recent(&items, 20), &items[5..]);
        assert_eq!(recent(&items[..3], 20), &items[..3]);
        assert!(recent(&items, 0).is_empty());
    }
}

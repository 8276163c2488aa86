use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::experience::ExperienceLevel;

/// Pool entry with its answer key. Never returned from freelancer routes;
/// convert with [`McqQuestion::to_public`] first.
#[derive(Debug, Clone, FromRow)]
pub struct McqQuestion {
    pub id: Uuid,
    pub category_id: Uuid,
    pub experience_level: ExperienceLevel,
    pub rotation_index: i32,
    pub question: String,
    pub options: Json<Vec<String>>,
    pub correct_option_index: i32,
    pub explanation: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicMcqQuestion {
    pub id: Uuid,
    pub question: String,
    pub options: Vec<String>,
}

impl McqQuestion {
    pub fn to_public(&self) -> PublicMcqQuestion {
        PublicMcqQuestion {
            id: self.id,
            question: self.question.clone(),
            options: self.options.0.clone(),
        }
    }

    pub fn is_correct(&self, selected: Option<i32>) -> bool {
        selected == Some(self.correct_option_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

/// Coding pool entry; `test_cases` carry expected outputs and stay server-side.
#[derive(Debug, Clone, FromRow)]
pub struct CodingPrompt {
    pub id: Uuid,
    pub category_id: Uuid,
    pub experience_level: ExperienceLevel,
    pub language: String,
    pub rotation_index: i32,
    pub title: String,
    pub description: String,
    pub starter_code: Option<String>,
    pub test_cases: Json<Vec<TestCase>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicCodingPrompt {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub language: String,
    pub starter_code: Option<String>,
    pub test_case_count: usize,
}

impl CodingPrompt {
    pub fn to_public(&self) -> PublicCodingPrompt {
        PublicCodingPrompt {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            starter_code: self.starter_code.clone(),
            test_case_count: self.test_cases.0.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct McqDraft {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option_index: i32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodingPromptDraft {
    pub title: String,
    pub description: String,
    pub starter_code: Option<String>,
    pub test_cases: Vec<TestCase>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_mcq_view_has_no_answer_key() {
        let q = McqQuestion {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            experience_level: ExperienceLevel::Mid,
            rotation_index: 0,
            question: "2+2?".into(),
            options: Json(vec!["3".into(), "4".into()]),
            correct_option_index: 1,
            explanation: Some("arithmetic".into()),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(q.to_public()).unwrap();
        assert!(json.get("correct_option_index").is_none());
        assert!(json.get("explanation").is_none());
        assert!(q.is_correct(Some(1)));
        assert!(!q.is_correct(None));
    }

    #[test]
    fn public_prompt_view_hides_expected_outputs() {
        let p = CodingPrompt {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            experience_level: ExperienceLevel::Senior,
            language: "rust".into(),
            rotation_index: 3,
            title: "Reverse".into(),
            description: "Reverse a string".into(),
            starter_code: None,
            test_cases: Json(vec![TestCase {
                input: "abc".into(),
                expected: "cba".into(),
            }]),
            created_at: Utc::now(),
        };
        let text = serde_json::to_string(&p.to_public()).unwrap();
        assert!(!text.contains("cba"));
        assert!(text.contains("\"test_case_count\":1"));
    }
}

use crate::models::experience::ExperienceLevel;
use crate::models::question::{CodingPromptDraft, McqDraft, TestCase};
use crate::services::complexity_service::{CodingTier, DifficultyTier};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub category_id: Uuid,
    pub category_name: String,
    pub experience_level: ExperienceLevel,
    pub difficulty: DifficultyTier,
    pub coding_tier: CodingTier,
    pub language: Option<String>,
    pub count: usize,
}

/// External authoring collaborator. May fail; callers degrade to whatever the
/// pool already holds.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate_mcqs(&self, request: &GenerationRequest) -> anyhow::Result<Vec<McqDraft>>;

    async fn generate_coding_prompts(
        &self,
        request: &GenerationRequest,
    ) -> anyhow::Result<Vec<CodingPromptDraft>>;
}

#[derive(Clone)]
pub struct AIService {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl AIService {
    pub fn new(api_key: Option<String>, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    async fn chat_openai(&self, payload: JsonValue) -> anyhow::Result<JsonValue> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not configured"))?;

        let res = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API Error {}: {}", status, text));
        }

        let body: JsonValue = res.json().await?;

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| anyhow!("Invalid OpenAI response format"))
    }
}

#[async_trait]
impl QuestionGenerator for AIService {
    async fn generate_mcqs(&self, request: &GenerationRequest) -> anyhow::Result<Vec<McqDraft>> {
        let system_prompt = r#"You are a senior technical interviewer writing a skills assessment.
Return a JSON object with a 'questions' array. Each item has:
'question' (string), 'options' (array of exactly 4 strings), 'correct_answer' (index of the correct option), 'explanation' (string).
Questions must be practical and unambiguous. Vary the position of the correct option.
Avoid "All of the above" and "None of the above"."#;

        let user = serde_json::json!({
            "category": request.category_name,
            "experience_level": request.experience_level,
            "difficulty": request.difficulty,
            "required_count": request.count,
        });

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user.to_string()}
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.8
        });

        let raw = self
            .chat_openai(payload)
            .await
            .with_context(|| format!("generating MCQs for {}", request.category_name))?;
        let drafts = sanitize_mcqs(&raw, request.count, &mut rand::thread_rng());
        tracing::info!(
            category = %request.category_name,
            level = request.experience_level.as_str(),
            requested = request.count,
            produced = drafts.len(),
            "generated MCQ drafts"
        );
        Ok(drafts)
    }

    async fn generate_coding_prompts(
        &self,
        request: &GenerationRequest,
    ) -> anyhow::Result<Vec<CodingPromptDraft>> {
        let language = request
            .language
            .as_deref()
            .ok_or_else(|| anyhow!("coding prompts need a language"))?;

        let system_prompt = r#"You are a senior engineer writing take-home coding exercises.
Return a JSON object with a 'prompts' array. Each item has:
'title', 'description', 'starter_code' (optional), and 'test_cases' (array of {'input','expected'} with at least 3 cases).
Exercises must be solvable within 15 minutes and deterministic."#;

        let user = serde_json::json!({
            "category": request.category_name,
            "language": language,
            "experience_level": request.experience_level,
            "tier": request.coding_tier,
            "required_count": request.count,
        });

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user.to_string()}
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.7
        });

        let raw = self
            .chat_openai(payload)
            .await
            .with_context(|| format!("generating {} prompts for {}", language, request.category_name))?;
        Ok(sanitize_prompts(&raw, request.count))
    }
}

fn items<'a>(raw: &'a JsonValue, key: &str) -> &'a [JsonValue] {
    raw.get(key)
        .and_then(|a| a.as_array())
        .or_else(|| raw.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

pub fn sanitize_mcqs(raw: &JsonValue, limit: usize, rng: &mut impl rand::Rng) -> Vec<McqDraft> {
    let mut drafts = Vec::new();
    for v in items(raw, "questions") {
        let question = match v.get("question").and_then(|s| s.as_str()) {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => continue,
        };
        let mut options: Vec<String> = v
            .get("options")
            .and_then(|o| o.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|x| x.as_str())
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if options.len() < 2 {
            continue;
        }

        let mut correct = v
            .get("correct_answer")
            .or_else(|| v.get("correct_option_index"))
            .and_then(|i| i.as_i64())
            .unwrap_or(0);
        if correct < 0 || correct as usize >= options.len() {
            correct = 0;
        }
        let correct_option = options[correct as usize].clone();
        options.shuffle(rng);
        let correct_option_index = options
            .iter()
            .position(|o| o == &correct_option)
            .unwrap_or(0) as i32;

        drafts.push(McqDraft {
            question,
            options,
            correct_option_index,
            explanation: v
                .get("explanation")
                .and_then(|s| s.as_str())
                .map(|s| s.to_string()),
        });
        if drafts.len() == limit {
            break;
        }
    }
    drafts
}

pub fn sanitize_prompts(raw: &JsonValue, limit: usize) -> Vec<CodingPromptDraft> {
    let mut drafts = Vec::new();
    for v in items(raw, "prompts") {
        let title = v.get("title").and_then(|s| s.as_str()).unwrap_or("").trim();
        let description = v
            .get("description")
            .and_then(|s| s.as_str())
            .unwrap_or("")
            .trim();
        if title.is_empty() || description.is_empty() {
            continue;
        }
        let test_cases: Vec<TestCase> = v
            .get("test_cases")
            .and_then(|a| a.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|tc| {
                        Some(TestCase {
                            input: json_text(tc.get("input")?),
                            expected: json_text(tc.get("expected")?),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        if test_cases.is_empty() {
            continue;
        }
        drafts.push(CodingPromptDraft {
            title: title.to_string(),
            description: description.to_string(),
            starter_code: v
                .get("starter_code")
                .and_then(|s| s.as_str())
                .map(|s| s.to_string()),
            test_cases,
        });
        if drafts.len() == limit {
            break;
        }
    }
    drafts
}

fn json_text(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! LLM 分类器
//!
//! 通过 OpenAI 兼容的 chat completions 接口调用托管模型，
//! 从回复文本中截取第一个 '{' 到最后一个 '}' 之间的片段解析为 JSON。

use async_trait::async_trait;
use hms_core::{HmsError, Mood, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::port::{Classifier, ClassifyRequest, MoodAssessment, TriageAssessment};

/// LLM 分类器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmClassifierConfig {
    /// chat completions 端点，例如 https://api.groq.com/openai/v1
    pub endpoint: String,
    /// 模型名称
    pub model: String,
    /// API 密钥
    pub api_key: String,
    /// 单次调用的超时上限
    pub timeout: Duration,
}

/// LLM 分类器
pub struct LlmClassifier {
    config: LlmClassifierConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

impl LlmClassifier {
    pub fn new(config: LlmClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HmsError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// 调用模型并返回回复正文
    async fn complete(&self, prompt: String) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.endpoint);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HmsError::ClassifierTimeout(format!("classifier call timed out: {}", e))
                } else {
                    HmsError::Classifier(format!("classifier request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(HmsError::Classifier(format!(
                "classifier returned status {}",
                response.status()
            )));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| HmsError::Classifier(format!("malformed classifier response: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HmsError::Classifier("classifier response has no choices".to_string()))
    }
}

/// 截取回复中第一个 '{' 到最后一个 '}' 之间的片段并解析
pub(crate) fn extract_json(content: &str) -> Result<serde_json::Value> {
    let start = content
        .find('{')
        .ok_or_else(|| HmsError::Classifier("no JSON object in classifier reply".to_string()))?;
    let end = content
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| HmsError::Classifier("unterminated JSON object in classifier reply".to_string()))?;

    serde_json::from_str(&content[start..=end])
        .map_err(|e| HmsError::Classifier(format!("invalid JSON in classifier reply: {}", e)))
}

fn mood_prompt(request: &ClassifyRequest) -> String {
    format!(
        "Analyze patient's emotional state based on:\n\
         - Vitals: BP {}/{}, HR {}\n\
         - Symptoms: {:?}\n\
         - Duration: {} hours\n\
         - Age: {}\n\
         Return JSON: {{ \"mood\": \"chosen_mood\" }}\n\
         return value of mood should be in [\"calm\",\"frustrated\",\"anxious\",\"stressed\",\"confused\",\"panicked\"]",
        request.vitals.systolic_or_default(),
        request.vitals.diastolic_or_default(),
        request.vitals.heart_rate_or_default(),
        request.symptoms,
        request.symptom_duration_hours,
        request.age,
    )
}

fn triage_prompt(request: &ClassifyRequest, mood: Option<Mood>) -> String {
    format!(
        "Assign triage_level (1-5) and department based on:\n\
         - Symptoms: {:?}\n\
         - BP: {}/{}\n\
         - HR: {}\n\
         - Mood: {}\n\
         - Age: {}\n\
         - Duration: {}h\n\
         Return JSON: {{\"triage_level\": number, \"department\": \"string\"}}\n\
         return value of department should be in [\"Cardiology\",\"Pediatrics\",\"Neurology\",\"Dentist\"]",
        request.symptoms,
        request.vitals.systolic_or_default(),
        request.vitals.diastolic_or_default(),
        request.vitals.heart_rate_or_default(),
        mood.map(|m| m.to_string()).unwrap_or_else(|| "unknown".to_string()),
        request.age,
        request.symptom_duration_hours,
    )
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify_mood(&self, request: &ClassifyRequest) -> Result<MoodAssessment> {
        debug!("Requesting mood estimate from model {}", self.config.model);
        let content = self.complete(mood_prompt(request)).await?;
        let value = extract_json(&content)?;

        let mood = value
            .get("mood")
            .and_then(|m| m.as_str())
            .ok_or_else(|| HmsError::Classifier("mood key missing in classifier reply".to_string()))?
            .parse::<Mood>()
            .map_err(|e| HmsError::Classifier(format!("unusable mood value: {}", e)))?;

        Ok(MoodAssessment { mood })
    }

    async fn classify_triage(
        &self,
        request: &ClassifyRequest,
        mood: Option<Mood>,
    ) -> Result<TriageAssessment> {
        debug!("Requesting triage estimate from model {}", self.config.model);
        let content = self.complete(triage_prompt(request, mood)).await?;
        let value = extract_json(&content)?;

        let triage_level = value
            .get("triage_level")
            .and_then(|l| l.as_u64())
            .ok_or_else(|| {
                HmsError::Classifier("triage_level key missing in classifier reply".to_string())
            })?;
        if !(1..=5).contains(&triage_level) {
            warn!("Classifier returned out-of-range triage level {}", triage_level);
            return Err(HmsError::Classifier(format!(
                "triage level out of range: {}",
                triage_level
            )));
        }

        let department = value
            .get("department")
            .and_then(|d| d.as_str())
            .ok_or_else(|| {
                HmsError::Classifier("department key missing in classifier reply".to_string())
            })?
            .parse()
            .map_err(|e| HmsError::Classifier(format!("unusable department value: {}", e)))?;

        Ok(TriageAssessment {
            triage_level: triage_level as u8,
            department,
        })
    }
}

//! 分类器端口定义

use async_trait::async_trait;
use hms_core::{Department, Mood, Result, Vitals};
use serde::{Deserialize, Serialize};

/// 分类请求，携带流水线在分类阶段可见的全部临床输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub vitals: Vitals,
    pub symptoms: Vec<String>,
    pub symptom_duration_hours: f64,
    pub age: u32,
}

/// 情绪评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodAssessment {
    pub mood: Mood,
}

/// 分诊评估结果
///
/// department 只允许是固定科室集合中的成员，等级限定 1-5；
/// 越界的响应在实现内部转换为分类器错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub triage_level: u8,
    pub department: Department,
}

/// 分类器接口
///
/// 实现方负责自己的超时策略：超时以 HmsError::ClassifierTimeout 上抛，
/// 响应格式错误以 HmsError::Classifier 上抛
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 评估患者情绪状态
    async fn classify_mood(&self, request: &ClassifyRequest) -> Result<MoodAssessment>;

    /// 评估分诊等级和目标科室
    async fn classify_triage(
        &self,
        request: &ClassifyRequest,
        mood: Option<Mood>,
    ) -> Result<TriageAssessment>;
}

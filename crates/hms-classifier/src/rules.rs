//! 规则层分类
//!
//! 两个用途：一是对模型给出的情绪做体征校正（体征不会说谎），
//! 二是提供一个完全离线、确定性的规则分类器，供测试、演示和无网络环境使用。

use async_trait::async_trait;
use hms_core::{Department, Mood, Result, Vitals};
use tracing::debug;

use crate::port::{Classifier, ClassifyRequest, MoodAssessment, TriageAssessment};

/// 根据生命体征校正情绪判断
///
/// 心动过速或舒张压过低视为恐慌；症状出现心脏骤停字样视为恐慌；
/// 轻咳且心率正常视为平静。其余情况保留模型的判断。
pub fn adjust_mood_for_vitals(vitals: &Vitals, symptoms: &[String], detected: Mood) -> Mood {
    let symptoms_str = symptoms.join(" ").to_lowercase();
    let hr = vitals.heart_rate_or_default();

    if hr > 120 || vitals.diastolic_or_default() < 80 {
        Mood::Panicked
    } else if symptoms_str.contains("cardiac arrest") {
        Mood::Panicked
    } else if symptoms_str.contains("mild cough") && hr < 100 {
        Mood::Calm
    } else {
        detected
    }
}

/// 规则分类器
///
/// 与 LLM 分类器实现同一端口，输出只由输入决定
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn base_mood(request: &ClassifyRequest) -> Mood {
        let hr = request.vitals.heart_rate_or_default();
        if hr > 110 {
            Mood::Anxious
        } else if request.symptom_duration_hours >= 48.0 {
            Mood::Frustrated
        } else if request
            .symptoms
            .iter()
            .any(|s| s.to_lowercase().contains("pain"))
        {
            Mood::Stressed
        } else {
            Mood::Calm
        }
    }

    fn department_for(request: &ClassifyRequest) -> Department {
        let symptoms = request.symptoms.join(" ").to_lowercase();
        if symptoms.contains("tooth") || symptoms.contains("dental") {
            Department::Dentist
        } else if symptoms.contains("seizure")
            || symptoms.contains("headache")
            || symptoms.contains("numbness")
            || symptoms.contains("dizz")
        {
            Department::Neurology
        } else if request.age < 15 {
            Department::Pediatrics
        } else {
            // 胸痛、心悸以及其余未识别症状默认走心内科
            Department::Cardiology
        }
    }

    fn triage_for(request: &ClassifyRequest) -> u8 {
        let symptoms = request.symptoms.join(" ").to_lowercase();
        if symptoms.contains("cardiac arrest") || symptoms.contains("unconscious") {
            return 5;
        }

        let mut level = 2u8;
        let hr = request.vitals.heart_rate_or_default();
        let sys = request.vitals.systolic_or_default();
        if hr > 120 || sys > 160 || sys < 90 {
            level += 2;
        } else if hr > 100 || sys > 140 {
            level += 1;
        }
        if symptoms.contains("chest pain") || symptoms.contains("breath") {
            level += 1;
        }
        level.clamp(1, 5)
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    async fn classify_mood(&self, request: &ClassifyRequest) -> Result<MoodAssessment> {
        let mood = Self::base_mood(request);
        debug!("Rule classifier mood estimate: {}", mood);
        Ok(MoodAssessment { mood })
    }

    async fn classify_triage(
        &self,
        request: &ClassifyRequest,
        _mood: Option<Mood>,
    ) -> Result<TriageAssessment> {
        let assessment = TriageAssessment {
            triage_level: Self::triage_for(request),
            department: Self::department_for(request),
        };
        debug!(
            "Rule classifier triage estimate: level {} -> {}",
            assessment.triage_level, assessment.department
        );
        Ok(assessment)
    }
}

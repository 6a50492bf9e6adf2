//! # HMS Classifier
//!
//! 临床分类器端口及其实现。分类器是入院流水线的外部协作方：
//! 输入生命体征和症状，输出情绪标签和 (分诊等级, 科室) 二元组。
//! 所有失败都以类型化错误上抛，绝不让流水线崩溃或挂起。

pub mod llm;
pub mod port;
pub mod rules;

pub use llm::{LlmClassifier, LlmClassifierConfig};
pub use port::{Classifier, ClassifyRequest, MoodAssessment, TriageAssessment};
pub use rules::{adjust_mood_for_vitals, RuleClassifier};

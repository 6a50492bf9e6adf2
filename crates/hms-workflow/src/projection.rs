//! 对外只读投影
//!
//! 调用方和展示层拿到的是格式化后的患者摘要：分数保留一位小数，
//! 时间戳格式化到毫秒。聚合的医生状态和床位统计读模型直接来自
//! 存储层 (hms-store)，与单次入院尝试无关。

use hms_core::utils::{format_time_ms, round1};
use hms_core::PatientRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 患者摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub gender: String,
    pub age: u32,
    pub symptoms: Vec<String>,
    pub symptom_duration_hours: f64,
    pub mood: Option<String>,
    pub triage_level: Option<u8>,
    pub department: Option<String>,
    pub assigned_doctor: Option<String>,
    pub assigned_bed: Option<i32>,
    pub priority_score: f64,
    pub treatment_completed: bool,
    pub treatment_end: Option<String>,
    pub entry_time: String,
}

impl PatientSummary {
    /// 从患者记录生成摘要
    pub fn from_record(patient: &PatientRecord) -> Self {
        Self {
            id: patient.id,
            name: patient.name.clone(),
            email: patient.email.clone(),
            contact_number: patient.phone.clone(),
            gender: format!("{:?}", patient.gender),
            age: patient.age,
            symptoms: patient.symptoms.clone(),
            symptom_duration_hours: patient.symptom_duration_hours,
            mood: patient.mood.map(|m| m.to_string()),
            triage_level: patient.triage_level,
            department: patient.department.map(|d| d.to_string()),
            assigned_doctor: patient.assigned_doctor_name.clone(),
            assigned_bed: patient.assigned_bed,
            priority_score: round1(patient.priority_score),
            treatment_completed: patient.treatment_completed,
            treatment_end: patient.treatment_end.as_ref().map(format_time_ms),
            entry_time: format_time_ms(&patient.entry_time),
        }
    }
}

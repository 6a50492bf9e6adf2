//! 入院优先级评分
//!
//! 纯函数评分，同样的输入永远得到同样的分数。分数用于等待队列排序，
//! 冲突解决阶段会在最终分诊等级确定后重新计算一次。

use crate::models::PatientRecord;
use crate::utils::round1;

const TRIAGE_WEIGHT: f64 = 10.0;
const VITAL_WEIGHT: f64 = 0.7;
const DURATION_WEIGHT: f64 = 0.2;

/// 计算患者的入院优先级分数
///
/// 分数构成：分诊等级 ×10 + 年龄分 (≥50 岁 8 分 / <15 岁 5 分) +
/// 生命体征偏离 ×0.7 + 症状持续小时数 ×0.2，结果保留一位小数。
/// 分诊等级未定时按 0 计。
pub fn score(patient: &PatientRecord) -> f64 {
    let triage_score = f64::from(patient.triage_level.unwrap_or(0)) * TRIAGE_WEIGHT;

    let age_score = if patient.age >= 50 {
        8.0
    } else if patient.age < 15 {
        5.0
    } else {
        0.0
    };

    let hr = f64::from(patient.vitals.heart_rate_or_default());
    let sys = f64::from(patient.vitals.systolic_or_default());
    let dia = f64::from(patient.vitals.diastolic_or_default());

    let hr_dev = (hr - 100.0).max(60.0 - hr).max(0.0);
    let sys_dev = if sys > 140.0 || sys < 90.0 {
        (sys - 120.0).abs()
    } else {
        0.0
    };
    let dia_dev = if dia > 90.0 || dia < 60.0 {
        (dia - 80.0).abs()
    } else {
        0.0
    };
    let vital_score = (hr_dev + sys_dev + dia_dev) * VITAL_WEIGHT;

    let duration_score = patient.symptom_duration_hours * DURATION_WEIGHT;

    round1(triage_score + age_score + vital_score + duration_score)
}

//! 入院执行上下文
//!
//! 一次入院尝试期间由流水线独占持有的共享状态：患者记录、追加式
//! 事件日志、按阶段的状态表和暂存已预定资源的缓存。结果投影完成后
//! 随尝试一起丢弃，绝不跨尝试共享。

use chrono::{DateTime, Utc};
use hms_core::utils::format_time_ms;
use hms_core::{BedCategory, PatientRecord, Stage, StageStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 暂存的医生预定，后续阶段引用它而不必回查存储
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedDoctor {
    pub id: Uuid,
    pub name: String,
    pub busy_from: DateTime<Utc>,
    pub busy_until: DateTime<Utc>,
}

/// 暂存的床位预定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedBed {
    pub id: i32,
    pub category: BedCategory,
}

/// 暂存缓存，记录本次尝试中实际预定到的资源
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScratchCache {
    pub doctor: Option<ReservedDoctor>,
    pub bed: Option<ReservedBed>,
}

/// 入院执行上下文
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    pub patient: PatientRecord,
    pub logs: Vec<String>,
    pub status: BTreeMap<Stage, StageStatus>,
    pub cache: ScratchCache,
}

impl AdmissionContext {
    /// 为一次入院尝试创建上下文，所有阶段初始为 Pending
    pub fn new(patient: PatientRecord) -> Self {
        let status = Stage::PIPELINE
            .iter()
            .map(|&stage| (stage, StageStatus::Pending))
            .collect();
        Self {
            patient,
            logs: Vec::new(),
            status,
            cache: ScratchCache::default(),
        }
    }

    /// 追加一条带毫秒时间戳的事件日志
    pub fn log(&mut self, stage: Stage, message: impl AsRef<str>) {
        self.logs.push(format!(
            "[{}] {} : {}",
            format_time_ms(&Utc::now()),
            stage,
            message.as_ref()
        ));
    }

    /// 写入阶段状态。每个阶段只写自己的条目
    pub fn set_status(&mut self, stage: Stage, status: StageStatus) {
        self.status.insert(stage, status);
    }

    /// 读取阶段状态
    pub fn status_of(&self, stage: Stage) -> StageStatus {
        self.status
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_core::{Gender, PatientIntake};

    fn context() -> AdmissionContext {
        AdmissionContext::new(PatientRecord::from_intake(PatientIntake {
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            gender: Gender::Female,
            age: 30,
            symptoms: vec![],
            symptom_duration_hours: 1.0,
            vitals: Default::default(),
        }))
    }

    #[test]
    fn test_all_stages_start_pending() {
        let ctx = context();
        for stage in Stage::PIPELINE {
            assert_eq!(ctx.status_of(stage), StageStatus::Pending);
        }
    }

    #[test]
    fn test_log_line_format() {
        let mut ctx = context();
        ctx.log(Stage::MoodAnalyzer, "Detected Mood is calm 😌");
        assert_eq!(ctx.logs.len(), 1);
        let line = &ctx.logs[0];
        // [HH:MM:SS.mmm] StageName : message
        assert!(line.starts_with('['));
        assert_eq!(&line[13..14], "]");
        assert!(line.contains("] MoodAnalyzer : Detected Mood is calm"));
    }

    #[test]
    fn test_status_updates_are_per_stage() {
        let mut ctx = context();
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
        assert_eq!(ctx.status_of(Stage::DoctorScheduler), StageStatus::Failed);
        assert_eq!(ctx.status_of(Stage::BedManager), StageStatus::Pending);
    }
}

//! 存储接口定义
//!
//! 入院流水线依赖的全部持久化操作。预定操作 (reserve_*) 必须是
//! 原子的读-改-写：两个并发的入院尝试绝不允许同时拿到同一个
//! 医生或同一张床。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_core::{
    BedCategory, BedRecord, Department, DoctorRecord, OngoingCase, PatientRecord, QueueEntry,
    Result,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 医生忙闲状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoctorAvailability {
    Available,
    Busy,
}

/// 医生状态视图（聚合读模型，独立于单次入院尝试）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorStatusView {
    pub doctor_id: Uuid,
    pub name: String,
    pub department: Department,
    pub status: DoctorAvailability,
    pub with_patient: Option<String>,
    pub time_remaining_minutes: Option<f64>,
    pub busy_from: Option<DateTime<Utc>>,
    pub busy_until: Option<DateTime<Utc>>,
}

/// 床位统计行：某一类别的可用/占用数量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedCensusRow {
    pub category: BedCategory,
    pub available: usize,
    pub occupied: usize,
}

/// 入院存储接口
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// 登记患者记录
    async fn insert_patient(&self, patient: &PatientRecord) -> Result<()>;

    /// 列出指定科室当前空闲的医生
    async fn list_available_doctors(&self, department: Department) -> Result<Vec<DoctorRecord>>;

    /// 预定医生。医生已被并发占用时返回 false，调用方决定后续策略
    async fn reserve_doctor(
        &self,
        id: Uuid,
        busy_from: DateTime<Utc>,
        busy_until: DateTime<Utc>,
    ) -> Result<bool>;

    /// 释放医生，清空忙碌标记和忙碌窗口
    async fn release_doctor(&self, id: Uuid) -> Result<()>;

    /// 列出指定类别当前未占用的床位，按床号升序
    async fn list_available_beds(&self, category: BedCategory) -> Result<Vec<BedRecord>>;

    /// 预定床位。床位已被并发占用时返回 false
    async fn reserve_bed(&self, id: i32) -> Result<bool>;

    /// 释放床位
    async fn release_bed(&self, id: i32) -> Result<()>;

    /// 建立在诊病例，关联患者、医生和床位
    async fn insert_case(&self, patient_id: Uuid, doctor_id: Uuid, bed_id: i32)
        -> Result<OngoingCase>;

    /// 加入等待队列。每位患者最多一个活跃条目：已存在时保留原条目并返回 false
    async fn enqueue(
        &self,
        patient_id: Uuid,
        priority_score: f64,
        category: BedCategory,
    ) -> Result<bool>;

    /// 队列快照，按 (分数降序, 入队时间升序) 排列
    async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>>;

    /// 释放忙碌窗口已过期的医生，返回释放数量
    async fn release_expired_doctors(&self, now: DateTime<Utc>) -> Result<usize>;

    /// 医生状态读模型
    async fn doctor_status(&self) -> Result<Vec<DoctorStatusView>>;

    /// 床位统计读模型
    async fn bed_census(&self) -> Result<Vec<BedCensusRow>>;
}

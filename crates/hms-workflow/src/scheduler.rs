//! 医生排班阶段
//!
//! 在目标科室的空闲医生中挑选一位并原子预定。忙碌时长按分诊等级
//! 计算：max(1, triage_level) 分钟。

use chrono::{Duration, Utc};
use hms_core::{HmsError, Result, Stage, StageStatus};
use hms_store::AdmissionStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{AdmissionContext, ReservedDoctor};
use crate::selector::DoctorSelector;

/// 医生忙碌窗口时长（分钟）
pub fn block_duration_minutes(triage_level: Option<u8>) -> i64 {
    i64::from(triage_level.unwrap_or(0)).max(1)
}

/// 医生排班器
pub struct DoctorScheduler {
    store: Arc<dyn AdmissionStore>,
    selector: Arc<dyn DoctorSelector>,
}

impl DoctorScheduler {
    pub fn new(store: Arc<dyn AdmissionStore>, selector: Arc<dyn DoctorSelector>) -> Self {
        Self { store, selector }
    }

    /// 执行排班阶段
    ///
    /// 资源不足只标记 Failed 并继续，存储错误和并发预定冲突上抛
    pub async fn run(&self, ctx: &mut AdmissionContext) -> Result<()> {
        let Some(department) = ctx.patient.department else {
            // 分诊阶段没有给出科室，无法排班，走队列路径
            warn!("No department assigned for {}, doctor stage fails", ctx.patient.name);
            ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
            ctx.log(
                Stage::DoctorScheduler,
                "No department assigned, cannot schedule a doctor.",
            );
            return Ok(());
        };

        debug!("Fetching available {} doctors", department);
        let candidates = self.store.list_available_doctors(department).await?;

        let Some(doctor) = self.selector.select(&candidates) else {
            ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
            ctx.log(
                Stage::DoctorScheduler,
                format!("No {} doctor available.", department),
            );
            return Ok(());
        };

        let busy_from = Utc::now();
        let busy_until = busy_from + Duration::minutes(block_duration_minutes(ctx.patient.triage_level));

        if !self.store.reserve_doctor(doctor.id, busy_from, busy_until).await? {
            // 候选查询和预定之间被并发尝试抢走，对本次尝试是致命错误
            return Err(HmsError::ReservationConflict(format!(
                "doctor {} reserved concurrently",
                doctor.id
            )));
        }

        info!(
            "Reserved doctor {} for {} ({} strategy, until {})",
            doctor.name,
            ctx.patient.name,
            self.selector.name(),
            busy_until
        );

        ctx.cache.doctor = Some(ReservedDoctor {
            id: doctor.id,
            name: doctor.name.clone(),
            busy_from,
            busy_until,
        });
        ctx.patient.assigned_doctor = Some(doctor.id);
        ctx.patient.assigned_doctor_name = Some(doctor.name.clone());
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Success);
        ctx.log(
            Stage::DoctorScheduler,
            format!("Assigned {} to {}", doctor.name, ctx.patient.name),
        );
        Ok(())
    }
}

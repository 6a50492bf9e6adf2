//! 冲突解决阶段
//!
//! 流水线的决策点。先按最终分诊等级重算优先级分数，然后根据
//! (医生状态, 床位状态) 四种组合走且只走一条策略：双成功建病例；
//! 单边成功先释放已到手的资源、再入队（补偿必须先于入队完成）；
//! 双失败无资源可释放，终态 Failed，不产生队列条目。

use hms_core::{BedCategory, HmsError, OngoingCase, Result, Stage, StageStatus};
use hms_store::AdmissionStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::AdmissionContext;

/// 冲突解决结果
#[derive(Debug, Clone)]
pub enum Resolution {
    /// 双资源到手，病例已建立
    Committed(OngoingCase),
    /// 单边资源已补偿释放，患者进入等待队列
    Queued,
    /// 医生和床位都没有，终态失败
    Failed,
}

/// 冲突解决器
pub struct ConflictResolver {
    store: Arc<dyn AdmissionStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn AdmissionStore>) -> Self {
        Self { store }
    }

    /// 执行冲突解决阶段
    pub async fn run(&self, ctx: &mut AdmissionContext) -> Result<Resolution> {
        // 分数必须反映最终的分诊等级
        ctx.patient.recalculate_priority();
        debug!("Recalculated priority score: {}", ctx.patient.priority_score);
        ctx.log(
            Stage::ConflictResolver,
            format!("Calculated priority score : {}", ctx.patient.priority_score),
        );

        let doctor_status = ctx.status_of(Stage::DoctorScheduler);
        let bed_status = ctx.status_of(Stage::BedManager);

        match (doctor_status, bed_status) {
            (StageStatus::Success, StageStatus::Success) => self.commit(ctx).await,
            (StageStatus::Success, _) => self.release_doctor_and_queue(ctx).await,
            (_, StageStatus::Success) => self.release_bed_and_queue(ctx).await,
            _ => {
                info!("Neither doctor nor bed reserved for {}", ctx.patient.name);
                ctx.log(
                    Stage::ConflictResolver,
                    "No beds and doctors available at this moment. Please try at nearby hospitals.",
                );
                ctx.set_status(Stage::ConflictResolver, StageStatus::Failed);
                Ok(Resolution::Failed)
            }
        }
    }

    /// 双资源都到手：建立在诊病例
    async fn commit(&self, ctx: &mut AdmissionContext) -> Result<Resolution> {
        let doctor = ctx
            .cache
            .doctor
            .clone()
            .ok_or_else(|| HmsError::Internal("doctor stage succeeded without a reservation".to_string()))?;
        let bed = ctx
            .cache
            .bed
            .clone()
            .ok_or_else(|| HmsError::Internal("bed stage succeeded without a reservation".to_string()))?;

        let case = self
            .store
            .insert_case(ctx.patient.id, doctor.id, bed.id)
            .await?;

        info!(
            "Committed case {} for {} (doctor {}, bed {})",
            case.id, ctx.patient.name, doctor.name, bed.id
        );
        ctx.log(
            Stage::ConflictResolver,
            format!("Assigning available doctor and bed to {}", ctx.patient.name),
        );
        ctx.set_status(Stage::ConflictResolver, StageStatus::Success);
        Ok(Resolution::Committed(case))
    }

    /// 医生到手但没有床位：释放医生，按首选床位类别入队
    async fn release_doctor_and_queue(&self, ctx: &mut AdmissionContext) -> Result<Resolution> {
        let doctor = ctx
            .cache
            .doctor
            .take()
            .ok_or_else(|| HmsError::Internal("doctor stage succeeded without a reservation".to_string()))?;

        self.store.release_doctor(doctor.id).await?;
        ctx.patient.clear_doctor_assignment();
        debug!("Reverted doctor {} reservation", doctor.name);

        ctx.log(
            Stage::ConflictResolver,
            "No beds available at this moment. Queuing the application.",
        );
        ctx.set_status(Stage::ConflictResolver, StageStatus::Queued);

        let preferred = BedCategory::preference_for(ctx.patient.triage_level)[0];
        self.enqueue(ctx, preferred).await?;
        Ok(Resolution::Queued)
    }

    /// 床位到手但没有医生：释放床位，按刚匹配到的类别入队
    async fn release_bed_and_queue(&self, ctx: &mut AdmissionContext) -> Result<Resolution> {
        let bed = ctx
            .cache
            .bed
            .take()
            .ok_or_else(|| HmsError::Internal("bed stage succeeded without a reservation".to_string()))?;

        self.store.release_bed(bed.id).await?;
        ctx.patient.clear_bed_assignment();
        debug!("Reverted bed {} reservation", bed.id);

        ctx.log(
            Stage::ConflictResolver,
            "No doctors available at this moment. Queuing the application.",
        );
        ctx.set_status(Stage::ConflictResolver, StageStatus::Queued);

        self.enqueue(ctx, bed.category).await?;
        Ok(Resolution::Queued)
    }

    /// 入队即恢复：条目落下后阶段状态由 Queued 转为 Success
    async fn enqueue(&self, ctx: &mut AdmissionContext, category: BedCategory) -> Result<()> {
        let inserted = self
            .store
            .enqueue(ctx.patient.id, ctx.patient.priority_score, category)
            .await?;
        if !inserted {
            warn!("Patient {} already queued, keeping earlier entry", ctx.patient.id);
        }
        info!(
            "Queued patient {} with preferred category {}",
            ctx.patient.name, category
        );
        ctx.set_status(Stage::ConflictResolver, StageStatus::Success);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ReservedBed, ReservedDoctor};
    use chrono::{Duration, Utc};
    use hms_core::{
        BedRecord, Department, DoctorRecord, Gender, PatientIntake, PatientRecord,
    };
    use hms_store::MemoryStore;

    fn context(triage: Option<u8>) -> AdmissionContext {
        let mut patient = PatientRecord::from_intake(PatientIntake {
            name: "Iris".to_string(),
            email: "iris@example.com".to_string(),
            gender: Gender::Female,
            age: 55,
            symptoms: vec!["chest pain".to_string()],
            symptom_duration_hours: 2.0,
            vitals: Default::default(),
        });
        patient.triage_level = triage;
        AdmissionContext::new(patient)
    }

    async fn store_with_doctor_and_bed() -> (Arc<MemoryStore>, DoctorRecord, BedRecord) {
        let store = Arc::new(MemoryStore::new());
        let doctor = DoctorRecord::new("Dr. Chen", Department::Cardiology);
        let bed = BedRecord::new(201, hms_core::BedCategory::Ward);
        store.add_doctor(doctor.clone()).await;
        store.add_bed(bed.clone()).await;
        (store, doctor, bed)
    }

    async fn reserve_doctor(store: &MemoryStore, ctx: &mut AdmissionContext, doctor: &DoctorRecord) {
        let now = Utc::now();
        let until = now + Duration::minutes(3);
        assert!(store.reserve_doctor(doctor.id, now, until).await.unwrap());
        ctx.cache.doctor = Some(ReservedDoctor {
            id: doctor.id,
            name: doctor.name.clone(),
            busy_from: now,
            busy_until: until,
        });
        ctx.patient.assigned_doctor = Some(doctor.id);
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Success);
    }

    async fn reserve_bed(store: &MemoryStore, ctx: &mut AdmissionContext, bed: &BedRecord) {
        assert!(store.reserve_bed(bed.id).await.unwrap());
        ctx.cache.bed = Some(ReservedBed {
            id: bed.id,
            category: bed.category,
        });
        ctx.patient.assigned_bed = Some(bed.id);
        ctx.set_status(Stage::BedManager, StageStatus::Success);
    }

    #[tokio::test]
    async fn test_both_success_commits_case() {
        let (store, doctor, bed) = store_with_doctor_and_bed().await;
        let mut ctx = context(Some(3));
        reserve_doctor(&store, &mut ctx, &doctor).await;
        reserve_bed(&store, &mut ctx, &bed).await;

        let resolution = ConflictResolver::new(store.clone())
            .run(&mut ctx)
            .await
            .unwrap();

        match resolution {
            Resolution::Committed(case) => {
                assert_eq!(case.doctor_id, doctor.id);
                assert_eq!(case.bed_id, bed.id);
            }
            other => panic!("expected commit, got {:?}", other),
        }
        assert_eq!(ctx.status_of(Stage::ConflictResolver), StageStatus::Success);
        assert_eq!(store.cases().await.len(), 1);
        // 队列不应有条目
        assert!(store.queue_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_doctor_failed_releases_bed_and_queues() {
        let (store, _doctor, bed) = store_with_doctor_and_bed().await;
        let mut ctx = context(Some(2));
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
        reserve_bed(&store, &mut ctx, &bed).await;

        let before = store
            .list_available_beds(bed.category)
            .await
            .unwrap()
            .len();

        let resolution = ConflictResolver::new(store.clone())
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Queued));
        // 床位计数恢复到预定前
        let after = store
            .list_available_beds(bed.category)
            .await
            .unwrap()
            .len();
        assert_eq!(after, before + 1);
        assert!(ctx.cache.bed.is_none());
        assert!(ctx.patient.assigned_bed.is_none());

        let queue = store.queue_snapshot().await.unwrap();
        assert_eq!(queue.len(), 1);
        // 入队类别是刚才实际匹配到的类别
        assert_eq!(queue[0].preferred_category, bed.category);
        assert_eq!(ctx.status_of(Stage::ConflictResolver), StageStatus::Success);
    }

    #[tokio::test]
    async fn test_bed_failed_releases_doctor_and_queues() {
        let (store, doctor, _bed) = store_with_doctor_and_bed().await;
        let mut ctx = context(Some(5));
        reserve_doctor(&store, &mut ctx, &doctor).await;
        ctx.set_status(Stage::BedManager, StageStatus::Failed);

        let resolution = ConflictResolver::new(store.clone())
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Queued));
        // 医生恢复空闲，忙碌窗口清空
        let available = store
            .list_available_doctors(Department::Cardiology)
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert!(available[0].busy_until.is_none());
        assert!(ctx.patient.assigned_doctor.is_none());

        let queue = store.queue_snapshot().await.unwrap();
        assert_eq!(queue.len(), 1);
        // 等级 5 的首选类别是 ICU
        assert_eq!(queue[0].preferred_category, BedCategory::Icu);
    }

    #[tokio::test]
    async fn test_both_failed_is_terminal_without_queue_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut ctx = context(Some(4));
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
        ctx.set_status(Stage::BedManager, StageStatus::Failed);

        let resolution = ConflictResolver::new(store.clone())
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(matches!(resolution, Resolution::Failed));
        assert_eq!(ctx.status_of(Stage::ConflictResolver), StageStatus::Failed);
        assert!(store.queue_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_score_recomputed_before_policy() {
        let store = Arc::new(MemoryStore::new());
        let mut ctx = context(Some(5));
        ctx.set_status(Stage::DoctorScheduler, StageStatus::Failed);
        ctx.set_status(Stage::BedManager, StageStatus::Failed);
        assert_eq!(ctx.patient.priority_score, 0.0);

        ConflictResolver::new(store).run(&mut ctx).await.unwrap();

        // 55 岁 +8，等级 5 → 50，症状 2 小时 → 0.4
        assert_eq!(ctx.patient.priority_score, 58.4);
        assert!(ctx
            .logs
            .iter()
            .any(|l| l.contains("Calculated priority score : 58.4")));
    }
}

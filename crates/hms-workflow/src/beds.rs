//! 床位分配阶段
//!
//! 按分诊等级推导床位类别的尝试顺序，逐类查询，第一个有空床的
//! 类别中选最小床号原子预定，成功即返回。

use hms_core::{BedCategory, HmsError, Result, Stage, StageStatus};
use hms_store::AdmissionStore;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::{AdmissionContext, ReservedBed};

/// 床位管理器
pub struct BedManager {
    store: Arc<dyn AdmissionStore>,
}

impl BedManager {
    pub fn new(store: Arc<dyn AdmissionStore>) -> Self {
        Self { store }
    }

    /// 执行床位分配阶段
    pub async fn run(&self, ctx: &mut AdmissionContext) -> Result<()> {
        let preference = BedCategory::preference_for(ctx.patient.triage_level);

        for &category in preference {
            debug!("Checking bed category {}", category);
            let beds = self.store.list_available_beds(category).await?;

            // 列表按床号升序，取第一张即最小床号
            let Some(bed) = beds.first() else {
                continue;
            };

            if !self.store.reserve_bed(bed.id).await? {
                return Err(HmsError::ReservationConflict(format!(
                    "bed {} reserved concurrently",
                    bed.id
                )));
            }

            info!("Reserved {} bed {} for {}", category, bed.id, ctx.patient.name);

            ctx.cache.bed = Some(ReservedBed {
                id: bed.id,
                category,
            });
            ctx.patient.assigned_bed = Some(bed.id);
            ctx.set_status(Stage::BedManager, StageStatus::Success);
            let triage = ctx
                .patient
                .triage_level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unset".to_string());
            ctx.log(
                Stage::BedManager,
                format!(
                    "{} assigned to {} bed {} (triage {})",
                    ctx.patient.name, category, bed.id, triage
                ),
            );
            return Ok(());
        }

        ctx.set_status(Stage::BedManager, StageStatus::Failed);
        ctx.log(
            Stage::BedManager,
            format!("No beds available for {}", ctx.patient.name),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hms_core::{BedRecord, Gender, PatientIntake, PatientRecord};
    use hms_store::MemoryStore;

    fn context(triage: Option<u8>) -> AdmissionContext {
        let mut patient = PatientRecord::from_intake(PatientIntake {
            name: "Mira".to_string(),
            email: "mira@example.com".to_string(),
            gender: Gender::Female,
            age: 27,
            symptoms: vec!["seizure".to_string()],
            symptom_duration_hours: 1.0,
            vitals: Default::default(),
        });
        patient.triage_level = triage;
        AdmissionContext::new(patient)
    }

    #[tokio::test]
    async fn test_level_five_falls_back_to_emergency() {
        let store = Arc::new(MemoryStore::new());
        // 没有 ICU 床，只有一张急诊床
        store.add_bed(BedRecord::new(501, BedCategory::Emergency)).await;
        store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;

        let mut ctx = context(Some(5));
        BedManager::new(store).run(&mut ctx).await.unwrap();

        let reserved = ctx.cache.bed.as_ref().unwrap();
        assert_eq!(reserved.category, BedCategory::Emergency);
        assert_eq!(reserved.id, 501);
        assert_eq!(ctx.status_of(Stage::BedManager), StageStatus::Success);
    }

    #[tokio::test]
    async fn test_first_matching_category_wins() {
        let store = Arc::new(MemoryStore::new());
        store.add_bed(BedRecord::new(301, BedCategory::Ward)).await;
        store.add_bed(BedRecord::new(501, BedCategory::Emergency)).await;

        let mut ctx = context(Some(3));
        BedManager::new(store).run(&mut ctx).await.unwrap();

        // Ward 在等级 3 的顺序里排在 Emergency 前面
        assert_eq!(ctx.cache.bed.as_ref().unwrap().category, BedCategory::Ward);
    }

    #[tokio::test]
    async fn test_lowest_bed_id_is_reserved() {
        let store = Arc::new(MemoryStore::new());
        store.add_bed(BedRecord::new(105, BedCategory::Normal)).await;
        store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;
        store.add_bed(BedRecord::new(103, BedCategory::Normal)).await;

        let mut ctx = context(Some(1));
        BedManager::new(store.clone()).run(&mut ctx).await.unwrap();

        assert_eq!(ctx.cache.bed.as_ref().unwrap().id, 101);
        let remaining = store
            .list_available_beds(BedCategory::Normal)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_all_categories_exhausted() {
        let store = Arc::new(MemoryStore::new());
        // 只有 ICU 床，但等级 2 的顺序是 Normal → Ward → Emergency
        store.add_bed(BedRecord::new(1, BedCategory::Icu)).await;

        let mut ctx = context(Some(2));
        BedManager::new(store).run(&mut ctx).await.unwrap();

        assert_eq!(ctx.status_of(Stage::BedManager), StageStatus::Failed);
        assert!(ctx.cache.bed.is_none());
        assert!(ctx.logs.iter().any(|l| l.contains("No beds available for Mira")));
    }

    #[tokio::test]
    async fn test_unset_triage_uses_default_preference() {
        let store = Arc::new(MemoryStore::new());
        store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;

        let mut ctx = context(None);
        BedManager::new(store).run(&mut ctx).await.unwrap();

        assert_eq!(ctx.cache.bed.as_ref().unwrap().category, BedCategory::Normal);
        assert!(ctx.logs.iter().any(|l| l.contains("(triage unset)")));
    }
}

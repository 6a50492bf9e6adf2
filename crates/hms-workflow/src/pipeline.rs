//! 入院编排流水线
//!
//! 拓扑固定：MoodAnalyzer → EmergencyTriage → DoctorScheduler →
//! BedManager → ConflictResolver。阶段失败不重试也不跳过后续阶段，
//! 分类失败后仍然尝试分配资源，保证队列路径可达。
//!
//! 存储错误对本次尝试是致命的：先释放暂存缓存里的全部预定，
//! 再把错误交还调用方。调用方中途放弃也走同一条补偿路径。

use hms_classifier::{adjust_mood_for_vitals, Classifier, ClassifyRequest};
use hms_core::{
    HmsError, OngoingCase, PatientIntake, PatientRecord, Result, Stage, StageStatus,
};
use hms_store::AdmissionStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::beds::BedManager;
use crate::context::AdmissionContext;
use crate::projection::PatientSummary;
use crate::resolver::{ConflictResolver, Resolution};
use crate::scheduler::DoctorScheduler;
use crate::selector::{DoctorSelector, RandomSelector};

/// 一次入院尝试的终态类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionOutcome {
    /// 病例已建立，医生和床位都已预定
    Admitted,
    /// 资源不齐，已补偿并进入等待队列（对调用方同样是成功终态）
    Queued,
    /// 医生和床位都没有，未产生队列条目
    Rejected,
}

/// 入院尝试的完整结果：终态、患者摘要、事件日志和阶段状态表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionResult {
    pub outcome: AdmissionOutcome,
    pub case: Option<OngoingCase>,
    pub summary: PatientSummary,
    pub logs: Vec<String>,
    pub status: BTreeMap<Stage, StageStatus>,
}

/// 入院编排流水线
pub struct AdmissionPipeline {
    store: Arc<dyn AdmissionStore>,
    classifier: Arc<dyn Classifier>,
    scheduler: DoctorScheduler,
    beds: BedManager,
    resolver: ConflictResolver,
}

impl AdmissionPipeline {
    /// 创建流水线，医生挑选用默认的随机策略
    pub fn new(store: Arc<dyn AdmissionStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self::with_selector(store, classifier, Arc::new(RandomSelector))
    }

    /// 创建流水线并指定医生挑选策略
    pub fn with_selector(
        store: Arc<dyn AdmissionStore>,
        classifier: Arc<dyn Classifier>,
        selector: Arc<dyn DoctorSelector>,
    ) -> Self {
        Self {
            scheduler: DoctorScheduler::new(store.clone(), selector),
            beds: BedManager::new(store.clone()),
            resolver: ConflictResolver::new(store.clone()),
            store,
            classifier,
        }
    }

    /// 处理一次入院尝试
    pub async fn admit(&self, intake: PatientIntake) -> Result<AdmissionResult> {
        let mut ctx = AdmissionContext::new(PatientRecord::from_intake(intake));
        info!("Admission attempt started for {}", ctx.patient.name);

        match self.run_stages(&mut ctx).await {
            Ok(resolution) => Ok(Self::project(ctx, resolution)),
            Err(e) => {
                error!("Admission attempt failed fatally: {}", e);
                self.compensate(&mut ctx).await;
                Err(e)
            }
        }
    }

    /// 处理一次可取消的入院尝试
    ///
    /// 取消信号在阶段边界生效：已预定的资源先释放，再以错误返回。
    /// 中途放弃等价于致命失败，走完全相同的补偿路径。
    pub async fn admit_with_cancel(
        &self,
        intake: PatientIntake,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<AdmissionResult> {
        let mut ctx = AdmissionContext::new(PatientRecord::from_intake(intake));
        info!("Cancellable admission attempt started for {}", ctx.patient.name);

        let outcome = self.run_stages_cancellable(&mut ctx, &mut cancel).await;
        match outcome {
            Ok(resolution) => Ok(Self::project(ctx, resolution)),
            Err(e) => {
                error!("Admission attempt aborted: {}", e);
                self.compensate(&mut ctx).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, ctx: &mut AdmissionContext) -> Result<Resolution> {
        self.run_mood(ctx).await?;
        self.run_triage(ctx).await?;
        self.scheduler.run(ctx).await?;
        self.beds.run(ctx).await?;
        self.resolver.run(ctx).await
    }

    async fn run_stages_cancellable(
        &self,
        ctx: &mut AdmissionContext,
        cancel: &mut oneshot::Receiver<()>,
    ) -> Result<Resolution> {
        Self::check_cancel(cancel)?;
        self.run_mood(ctx).await?;
        Self::check_cancel(cancel)?;
        self.run_triage(ctx).await?;
        Self::check_cancel(cancel)?;
        self.scheduler.run(ctx).await?;
        Self::check_cancel(cancel)?;
        self.beds.run(ctx).await?;
        Self::check_cancel(cancel)?;
        self.resolver.run(ctx).await
    }

    fn check_cancel(cancel: &mut oneshot::Receiver<()>) -> Result<()> {
        match cancel.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => Ok(()),
            // 信号已发出或发送端已丢弃都视为调用方放弃
            _ => Err(HmsError::Internal(
                "admission attempt aborted by caller".to_string(),
            )),
        }
    }

    /// 情绪分析阶段。先把患者登记入库，再请求分类器
    async fn run_mood(&self, ctx: &mut AdmissionContext) -> Result<()> {
        self.store.insert_patient(&ctx.patient).await?;
        debug!("Patient record inserted for {}", ctx.patient.name);

        let request = Self::classify_request(&ctx.patient);
        match self.classifier.classify_mood(&request).await {
            Ok(assessment) => {
                let mood = adjust_mood_for_vitals(
                    &ctx.patient.vitals,
                    &ctx.patient.symptoms,
                    assessment.mood,
                );
                ctx.patient.mood = Some(mood);
                ctx.set_status(Stage::MoodAnalyzer, StageStatus::Success);
                ctx.log(
                    Stage::MoodAnalyzer,
                    format!("Detected Mood is {} {}", mood, mood.emoji()),
                );
            }
            Err(e) if e.is_classifier() => {
                warn!("Mood classification failed: {}", e);
                ctx.set_status(Stage::MoodAnalyzer, StageStatus::Failed);
                ctx.log(Stage::MoodAnalyzer, e.to_string());
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// 分诊阶段。成功后写入分诊等级和科室
    async fn run_triage(&self, ctx: &mut AdmissionContext) -> Result<()> {
        let request = Self::classify_request(&ctx.patient);
        match self
            .classifier
            .classify_triage(&request, ctx.patient.mood)
            .await
        {
            Ok(assessment) => {
                ctx.patient.triage_level = Some(assessment.triage_level);
                ctx.patient.department = Some(assessment.department);
                ctx.set_status(Stage::EmergencyTriage, StageStatus::Success);
                ctx.log(
                    Stage::EmergencyTriage,
                    format!(
                        "Level {} -> {}",
                        assessment.triage_level, assessment.department
                    ),
                );
            }
            Err(e) if e.is_classifier() => {
                // 科室和等级保持未定，下游照常执行以保住队列路径
                warn!("Triage classification failed: {}", e);
                ctx.set_status(Stage::EmergencyTriage, StageStatus::Failed);
                ctx.log(Stage::EmergencyTriage, e.to_string());
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// 释放暂存缓存中的全部预定并清空对应的患者字段
    ///
    /// 补偿是尽力而为的：单个释放失败只记日志，不阻止其余资源释放
    pub async fn compensate(&self, ctx: &mut AdmissionContext) {
        if let Some(doctor) = ctx.cache.doctor.take() {
            match self.store.release_doctor(doctor.id).await {
                Ok(()) => {
                    ctx.patient.clear_doctor_assignment();
                    ctx.log(
                        Stage::DoctorScheduler,
                        format!("Released doctor {} after aborted attempt", doctor.name),
                    );
                }
                Err(e) => error!("Failed to release doctor {}: {}", doctor.id, e),
            }
        }

        if let Some(bed) = ctx.cache.bed.take() {
            match self.store.release_bed(bed.id).await {
                Ok(()) => {
                    ctx.patient.clear_bed_assignment();
                    ctx.log(
                        Stage::BedManager,
                        format!("Released {} bed {} after aborted attempt", bed.category, bed.id),
                    );
                }
                Err(e) => error!("Failed to release bed {}: {}", bed.id, e),
            }
        }
    }

    fn classify_request(patient: &PatientRecord) -> ClassifyRequest {
        ClassifyRequest {
            vitals: patient.vitals,
            symptoms: patient.symptoms.clone(),
            symptom_duration_hours: patient.symptom_duration_hours,
            age: patient.age,
        }
    }

    fn project(ctx: AdmissionContext, resolution: Resolution) -> AdmissionResult {
        let (outcome, case) = match resolution {
            Resolution::Committed(case) => (AdmissionOutcome::Admitted, Some(case)),
            Resolution::Queued => (AdmissionOutcome::Queued, None),
            Resolution::Failed => (AdmissionOutcome::Rejected, None),
        };
        AdmissionResult {
            outcome,
            case,
            summary: PatientSummary::from_record(&ctx.patient),
            logs: ctx.logs,
            status: ctx.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use hms_classifier::{MoodAssessment, TriageAssessment};
    use hms_core::{
        BedCategory, BedRecord, Department, DoctorRecord, Gender, Mood, QueueEntry, Vitals,
    };
    use hms_store::{BedCensusRow, DoctorStatusView, MemoryStore};
    use uuid::Uuid;

    /// 固定输出的分类器桩
    struct StubClassifier {
        mood: Mood,
        triage_level: u8,
        department: Department,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify_mood(&self, _request: &ClassifyRequest) -> Result<MoodAssessment> {
            Ok(MoodAssessment { mood: self.mood })
        }

        async fn classify_triage(
            &self,
            _request: &ClassifyRequest,
            _mood: Option<Mood>,
        ) -> Result<TriageAssessment> {
            Ok(TriageAssessment {
                triage_level: self.triage_level,
                department: self.department,
            })
        }
    }

    /// 一律失败的分类器桩
    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify_mood(&self, _request: &ClassifyRequest) -> Result<MoodAssessment> {
            Err(HmsError::ClassifierTimeout("mood call timed out".to_string()))
        }

        async fn classify_triage(
            &self,
            _request: &ClassifyRequest,
            _mood: Option<Mood>,
        ) -> Result<TriageAssessment> {
            Err(HmsError::Classifier("malformed reply".to_string()))
        }
    }

    /// 建病例时报错的存储包装，用于验证致命错误的补偿路径
    struct CaseFailingStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl AdmissionStore for CaseFailingStore {
        async fn insert_patient(&self, patient: &hms_core::PatientRecord) -> Result<()> {
            self.inner.insert_patient(patient).await
        }
        async fn list_available_doctors(
            &self,
            department: Department,
        ) -> Result<Vec<DoctorRecord>> {
            self.inner.list_available_doctors(department).await
        }
        async fn reserve_doctor(
            &self,
            id: Uuid,
            busy_from: DateTime<Utc>,
            busy_until: DateTime<Utc>,
        ) -> Result<bool> {
            self.inner.reserve_doctor(id, busy_from, busy_until).await
        }
        async fn release_doctor(&self, id: Uuid) -> Result<()> {
            self.inner.release_doctor(id).await
        }
        async fn list_available_beds(&self, category: BedCategory) -> Result<Vec<BedRecord>> {
            self.inner.list_available_beds(category).await
        }
        async fn reserve_bed(&self, id: i32) -> Result<bool> {
            self.inner.reserve_bed(id).await
        }
        async fn release_bed(&self, id: i32) -> Result<()> {
            self.inner.release_bed(id).await
        }
        async fn insert_case(
            &self,
            _patient_id: Uuid,
            _doctor_id: Uuid,
            _bed_id: i32,
        ) -> Result<hms_core::OngoingCase> {
            Err(HmsError::Store("connection reset during insert".to_string()))
        }
        async fn enqueue(
            &self,
            patient_id: Uuid,
            priority_score: f64,
            category: BedCategory,
        ) -> Result<bool> {
            self.inner.enqueue(patient_id, priority_score, category).await
        }
        async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>> {
            self.inner.queue_snapshot().await
        }
        async fn release_expired_doctors(&self, now: DateTime<Utc>) -> Result<usize> {
            self.inner.release_expired_doctors(now).await
        }
        async fn doctor_status(&self) -> Result<Vec<DoctorStatusView>> {
            self.inner.doctor_status().await
        }
        async fn bed_census(&self) -> Result<Vec<BedCensusRow>> {
            self.inner.bed_census().await
        }
    }

    fn intake(name: &str) -> PatientIntake {
        PatientIntake {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            gender: Gender::Other,
            age: 45,
            symptoms: vec!["chest pain".to_string()],
            symptom_duration_hours: 3.0,
            vitals: Vitals::default(),
        }
    }

    fn pipeline(
        store: Arc<dyn AdmissionStore>,
        classifier: Arc<dyn Classifier>,
    ) -> AdmissionPipeline {
        AdmissionPipeline::with_selector(
            store,
            classifier,
            Arc::new(crate::selector::FirstAvailableSelector),
        )
    }

    // 场景 A：等级 5 心内科，有医生，没有 ICU 床但有急诊床 → 建病例
    #[tokio::test]
    async fn test_scenario_commit_with_emergency_fallback() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_doctor(DoctorRecord::new("Dr. Chen", Department::Cardiology))
            .await;
        store.add_bed(BedRecord::new(501, BedCategory::Emergency)).await;

        let classifier = Arc::new(StubClassifier {
            mood: Mood::Panicked,
            triage_level: 5,
            department: Department::Cardiology,
        });

        let result = pipeline(store.clone(), classifier)
            .admit(intake("Elena"))
            .await
            .unwrap();

        assert_eq!(result.outcome, AdmissionOutcome::Admitted);
        let case = result.case.unwrap();
        assert_eq!(case.bed_id, 501);
        assert_eq!(result.status[&Stage::ConflictResolver], StageStatus::Success);
        assert_eq!(result.summary.assigned_bed, Some(501));
        assert_eq!(result.summary.department.as_deref(), Some("Cardiology"));

        // 医生忙碌 5 分钟，急诊床被占
        let census = store.bed_census().await.unwrap();
        assert_eq!(census[0].occupied, 1);
        assert!(store
            .list_available_doctors(Department::Cardiology)
            .await
            .unwrap()
            .is_empty());
    }

    // 场景 B：等级 2 神经科，无医生，有普通床 → 释放床位并入队，报告成功
    #[tokio::test]
    async fn test_scenario_queue_after_doctor_shortage() {
        let store = Arc::new(MemoryStore::new());
        store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;

        let classifier = Arc::new(StubClassifier {
            mood: Mood::Anxious,
            triage_level: 2,
            department: Department::Neurology,
        });

        let result = pipeline(store.clone(), classifier)
            .admit(intake("Marcus"))
            .await
            .unwrap();

        assert_eq!(result.outcome, AdmissionOutcome::Queued);
        assert_eq!(result.status[&Stage::DoctorScheduler], StageStatus::Failed);
        assert_eq!(result.status[&Stage::BedManager], StageStatus::Success);
        // 入队后冲突解决阶段报告成功
        assert_eq!(result.status[&Stage::ConflictResolver], StageStatus::Success);

        // 普通床计数恢复
        assert_eq!(
            store
                .list_available_beds(BedCategory::Normal)
                .await
                .unwrap()
                .len(),
            1
        );
        let queue = store.queue_snapshot().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].preferred_category, BedCategory::Normal);
        assert!(result.summary.assigned_bed.is_none());
    }

    // 场景 C：什么资源都没有 → 终态 Rejected，不产生队列条目
    #[tokio::test]
    async fn test_scenario_double_failure_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let classifier = Arc::new(StubClassifier {
            mood: Mood::Stressed,
            triage_level: 4,
            department: Department::Dentist,
        });

        let result = pipeline(store.clone(), classifier)
            .admit(intake("Noor"))
            .await
            .unwrap();

        assert_eq!(result.outcome, AdmissionOutcome::Rejected);
        assert_eq!(result.status[&Stage::ConflictResolver], StageStatus::Failed);
        assert!(store.queue_snapshot().await.unwrap().is_empty());
    }

    // 分类器失败不中止流水线：科室未定医生失败，但床位照常分配，队列路径可达
    #[tokio::test]
    async fn test_classifier_failure_keeps_queue_path_reachable() {
        let store = Arc::new(MemoryStore::new());
        store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;

        let result = pipeline(store.clone(), Arc::new(FailingClassifier))
            .admit(intake("Priya"))
            .await
            .unwrap();

        assert_eq!(result.status[&Stage::MoodAnalyzer], StageStatus::Failed);
        assert_eq!(result.status[&Stage::EmergencyTriage], StageStatus::Failed);
        assert_eq!(result.status[&Stage::DoctorScheduler], StageStatus::Failed);
        assert_eq!(result.status[&Stage::BedManager], StageStatus::Success);
        assert_eq!(result.outcome, AdmissionOutcome::Queued);
        assert!(result.summary.mood.is_none());
        assert!(result.summary.triage_level.is_none());

        // 床位释放，入队类别是默认顺序里匹配到的 Normal
        let queue = store.queue_snapshot().await.unwrap();
        assert_eq!(queue[0].preferred_category, BedCategory::Normal);
    }

    // 结果类别幂等：同样的初始资源池和分类器桩，重放得到同类终态
    #[tokio::test]
    async fn test_outcome_class_is_replayable() {
        for _ in 0..3 {
            let store = Arc::new(MemoryStore::new());
            store
                .add_doctor(DoctorRecord::new("Dr. Chen", Department::Pediatrics))
                .await;
            store
                .add_doctor(DoctorRecord::new("Dr. Alvarez", Department::Pediatrics))
                .await;
            store.add_bed(BedRecord::new(201, BedCategory::Ward)).await;

            let classifier = Arc::new(StubClassifier {
                mood: Mood::Calm,
                triage_level: 3,
                department: Department::Pediatrics,
            });

            // 随机策略也不改变终态类别
            let result = AdmissionPipeline::new(store, classifier)
                .admit(intake("Ivo"))
                .await
                .unwrap();
            assert_eq!(result.outcome, AdmissionOutcome::Admitted);
        }
    }

    // 建病例失败是致命错误：医生和床位都必须回到池子里
    #[tokio::test]
    async fn test_fatal_store_error_compensates_reservations() {
        let inner = MemoryStore::new();
        inner
            .add_doctor(DoctorRecord::new("Dr. Chen", Department::Cardiology))
            .await;
        inner.add_bed(BedRecord::new(301, BedCategory::Ward)).await;
        let store = Arc::new(CaseFailingStore { inner });

        let classifier = Arc::new(StubClassifier {
            mood: Mood::Calm,
            triage_level: 3,
            department: Department::Cardiology,
        });

        let err = pipeline(store.clone(), classifier)
            .admit(intake("Sana"))
            .await
            .unwrap_err();
        assert!(matches!(err, HmsError::Store(_)));

        // 补偿完成：医生空闲，床位可用，队列为空
        assert_eq!(
            store
                .list_available_doctors(Department::Cardiology)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store
                .list_available_beds(BedCategory::Ward)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store.queue_snapshot().await.unwrap().is_empty());
    }

    // 调用方提前放弃：预定尚未发生时直接返回错误，资源池不变
    #[tokio::test]
    async fn test_cancel_before_start_reserves_nothing() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_doctor(DoctorRecord::new("Dr. Chen", Department::Cardiology))
            .await;
        store.add_bed(BedRecord::new(301, BedCategory::Ward)).await;

        let classifier = Arc::new(StubClassifier {
            mood: Mood::Calm,
            triage_level: 3,
            department: Department::Cardiology,
        });

        let (tx, rx) = oneshot::channel();
        tx.send(()).unwrap();

        let err = pipeline(store.clone(), classifier)
            .admit_with_cancel(intake("Omar"), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, HmsError::Internal(_)));

        assert_eq!(
            store
                .list_available_doctors(Department::Cardiology)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            store.list_available_beds(BedCategory::Ward).await.unwrap().len(),
            1
        );
    }
}

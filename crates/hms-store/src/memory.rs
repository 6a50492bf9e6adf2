//! 内存存储实现
//!
//! 全部状态在一把 RwLock 后面，每个接口方法在一个写锁区间内完成
//! 读-改-写，天然满足预定操作的原子性要求。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_core::{
    BedCategory, BedRecord, Department, DoctorRecord, HmsError, OngoingCase, PatientRecord,
    QueueEntry, Result,
};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{
    AdmissionStore, BedCensusRow, DoctorAvailability, DoctorStatusView,
};

#[derive(Debug, Default)]
struct Inner {
    doctors: HashMap<Uuid, DoctorRecord>,
    beds: BTreeMap<i32, BedRecord>, // 床号升序，保证平票时选最小床号
    patients: HashMap<Uuid, PatientRecord>,
    cases: Vec<OngoingCase>,
    queue: Vec<QueueEntry>,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一名医生（初始化资源池用）
    pub async fn add_doctor(&self, doctor: DoctorRecord) {
        let mut inner = self.inner.write().await;
        inner.doctors.insert(doctor.id, doctor);
    }

    /// 登记一张床位（初始化资源池用）
    pub async fn add_bed(&self, bed: BedRecord) {
        let mut inner = self.inner.write().await;
        inner.beds.insert(bed.id, bed);
    }

    /// 当前在诊病例快照
    pub async fn cases(&self) -> Vec<OngoingCase> {
        self.inner.read().await.cases.clone()
    }
}

#[async_trait]
impl AdmissionStore for MemoryStore {
    async fn insert_patient(&self, patient: &PatientRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.patients.insert(patient.id, patient.clone());
        debug!("Inserted patient record {} ({})", patient.id, patient.name);
        Ok(())
    }

    async fn list_available_doctors(&self, department: Department) -> Result<Vec<DoctorRecord>> {
        let inner = self.inner.read().await;
        let mut doctors: Vec<DoctorRecord> = inner
            .doctors
            .values()
            .filter(|d| d.department == department && !d.is_busy)
            .cloned()
            .collect();
        // 名字排序让候选列表在多次查询之间保持稳定
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }

    async fn reserve_doctor(
        &self,
        id: Uuid,
        busy_from: DateTime<Utc>,
        busy_until: DateTime<Utc>,
    ) -> Result<bool> {
        if busy_until <= busy_from {
            return Err(HmsError::Validation(format!(
                "busy window must end after it starts: {}..{}",
                busy_from, busy_until
            )));
        }

        let mut inner = self.inner.write().await;
        let doctor = inner
            .doctors
            .get_mut(&id)
            .ok_or_else(|| HmsError::NotFound(format!("doctor {} not found", id)))?;

        if doctor.is_busy {
            warn!("Doctor {} already reserved by a concurrent attempt", id);
            return Ok(false);
        }

        doctor.is_busy = true;
        doctor.busy_from = Some(busy_from);
        doctor.busy_until = Some(busy_until);
        info!("Reserved doctor {} until {}", doctor.name, busy_until);
        Ok(true)
    }

    async fn release_doctor(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let doctor = inner
            .doctors
            .get_mut(&id)
            .ok_or_else(|| HmsError::NotFound(format!("doctor {} not found", id)))?;

        doctor.is_busy = false;
        doctor.busy_from = None;
        doctor.busy_until = None;
        info!("Released doctor {}", doctor.name);
        Ok(())
    }

    async fn list_available_beds(&self, category: BedCategory) -> Result<Vec<BedRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .beds
            .values()
            .filter(|b| b.category == category && !b.is_occupied)
            .cloned()
            .collect())
    }

    async fn reserve_bed(&self, id: i32) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let bed = inner
            .beds
            .get_mut(&id)
            .ok_or_else(|| HmsError::NotFound(format!("bed {} not found", id)))?;

        if bed.is_occupied {
            warn!("Bed {} already reserved by a concurrent attempt", id);
            return Ok(false);
        }

        bed.is_occupied = true;
        info!("Reserved {} bed {}", bed.category, id);
        Ok(true)
    }

    async fn release_bed(&self, id: i32) -> Result<()> {
        let mut inner = self.inner.write().await;
        let bed = inner
            .beds
            .get_mut(&id)
            .ok_or_else(|| HmsError::NotFound(format!("bed {} not found", id)))?;

        bed.is_occupied = false;
        info!("Released {} bed {}", bed.category, id);
        Ok(())
    }

    async fn insert_case(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        bed_id: i32,
    ) -> Result<OngoingCase> {
        let mut inner = self.inner.write().await;
        let case = OngoingCase {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            bed_id,
            opened_at: Utc::now(),
        };
        inner.cases.push(case.clone());
        info!(
            "Opened case {} (patient {}, doctor {}, bed {})",
            case.id, patient_id, doctor_id, bed_id
        );
        Ok(case)
    }

    async fn enqueue(
        &self,
        patient_id: Uuid,
        priority_score: f64,
        category: BedCategory,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.queue.iter().any(|e| e.patient_id == patient_id) {
            // 先入队的条目保留更早的时间戳，重复入队不改变公平顺序
            warn!("Patient {} already has an active queue entry", patient_id);
            return Ok(false);
        }

        inner.queue.push(QueueEntry {
            patient_id,
            priority_score,
            preferred_category: category,
            enqueued_at: Utc::now(),
        });
        info!(
            "Queued patient {} (score {}, preferred {})",
            patient_id, priority_score, category
        );
        Ok(true)
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>> {
        let inner = self.inner.read().await;
        let mut entries = inner.queue.clone();
        entries.sort_by(|a, b| a.cmp_priority(b));
        Ok(entries)
    }

    async fn release_expired_doctors(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let mut released = 0;
        for doctor in inner.doctors.values_mut() {
            if doctor.is_busy && doctor.busy_until.map(|t| t <= now).unwrap_or(true) {
                doctor.is_busy = false;
                doctor.busy_from = None;
                doctor.busy_until = None;
                released += 1;
            }
        }
        if released > 0 {
            info!("Released {} doctors with expired busy windows", released);
        }
        Ok(released)
    }

    async fn doctor_status(&self) -> Result<Vec<DoctorStatusView>> {
        let inner = self.inner.read().await;
        let now = Utc::now();
        let mut views: Vec<DoctorStatusView> = inner
            .doctors
            .values()
            .map(|doctor| {
                let with_patient = if doctor.is_busy {
                    inner
                        .cases
                        .iter()
                        .rev()
                        .find(|c| c.doctor_id == doctor.id)
                        .and_then(|c| inner.patients.get(&c.patient_id))
                        .map(|p| p.name.clone())
                } else {
                    None
                };
                let time_remaining_minutes = if doctor.is_busy {
                    doctor.busy_until.map(|until| {
                        let secs = (until - now).num_milliseconds() as f64 / 1000.0;
                        (secs / 60.0 * 100.0).round() / 100.0
                    })
                } else {
                    None
                };
                DoctorStatusView {
                    doctor_id: doctor.id,
                    name: doctor.name.clone(),
                    department: doctor.department,
                    status: if doctor.is_busy {
                        DoctorAvailability::Busy
                    } else {
                        DoctorAvailability::Available
                    },
                    with_patient,
                    time_remaining_minutes,
                    busy_from: if doctor.is_busy { doctor.busy_from } else { None },
                    busy_until: if doctor.is_busy { doctor.busy_until } else { None },
                }
            })
            .collect();
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn bed_census(&self) -> Result<Vec<BedCensusRow>> {
        let inner = self.inner.read().await;
        let mut counts: BTreeMap<BedCategory, (usize, usize)> = BTreeMap::new();
        for bed in inner.beds.values() {
            let entry = counts.entry(bed.category).or_insert((0, 0));
            if bed.is_occupied {
                entry.1 += 1;
            } else {
                entry.0 += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(category, (available, occupied))| BedCensusRow {
                category,
                available,
                occupied,
            })
            .collect())
    }
}

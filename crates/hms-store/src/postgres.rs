//! Postgres 存储实现
//!
//! 全部使用参数化查询。预定操作靠条件 UPDATE 的受影响行数保证原子性：
//! `WHERE ... AND is_busy = FALSE` 在行级锁下要么改到一行，要么一行不改。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hms_core::{
    BedCategory, BedRecord, Department, DoctorRecord, HmsError, OngoingCase, PatientRecord,
    QueueEntry, Result,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::store::{AdmissionStore, BedCensusRow, DoctorAvailability, DoctorStatusView};

/// Postgres 存储
pub struct PgStore {
    pool: PgPool,
}

fn db_err(e: sqlx::Error) -> HmsError {
    HmsError::Store(e.to_string())
}

impl PgStore {
    /// 连接数据库
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 创建数据表
    pub async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patient_info (
                patient_id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                phone VARCHAR(32),
                gender VARCHAR(16) NOT NULL,
                age INTEGER NOT NULL,
                symptoms TEXT NOT NULL,
                symptoms_duration DOUBLE PRECISION NOT NULL,
                vitals JSONB NOT NULL,
                entry_time TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS doctors (
                doctor_id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                department VARCHAR(32) NOT NULL,
                is_busy BOOLEAN NOT NULL DEFAULT FALSE,
                busy_from TIMESTAMP WITH TIME ZONE,
                busy_until TIMESTAMP WITH TIME ZONE
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                room_number INTEGER PRIMARY KEY,
                category VARCHAR(16) NOT NULL,
                is_occupied BOOLEAN NOT NULL DEFAULT FALSE
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ongoing_cases (
                case_id UUID PRIMARY KEY,
                patient_id UUID NOT NULL REFERENCES patient_info(patient_id),
                doctor_id UUID NOT NULL REFERENCES doctors(doctor_id),
                room_number INTEGER NOT NULL REFERENCES rooms(room_number),
                opened_at TIMESTAMP WITH TIME ZONE NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue (
                patient_id UUID PRIMARY KEY,
                priority_score DOUBLE PRECISION NOT NULL,
                preferred_category VARCHAR(16) NOT NULL,
                enqueued_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        info!("Admission tables created");
        Ok(())
    }

    fn doctor_from_row(row: &sqlx::postgres::PgRow) -> Result<DoctorRecord> {
        Ok(DoctorRecord {
            id: row.try_get("doctor_id").map_err(db_err)?,
            name: row.try_get("name").map_err(db_err)?,
            department: row
                .try_get::<String, _>("department")
                .map_err(db_err)?
                .parse()?,
            is_busy: row.try_get("is_busy").map_err(db_err)?,
            busy_from: row.try_get("busy_from").map_err(db_err)?,
            busy_until: row.try_get("busy_until").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl AdmissionStore for PgStore {
    async fn insert_patient(&self, patient: &PatientRecord) -> Result<()> {
        let gender = format!("{:?}", patient.gender);
        let vitals = serde_json::to_string(&patient.vitals)?;
        sqlx::query(
            r#"
            INSERT INTO patient_info
                (patient_id, name, email, phone, gender, age, symptoms, symptoms_duration, vitals, entry_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb, $10)
        "#,
        )
        .bind(patient.id)
        .bind(&patient.name)
        .bind(&patient.email)
        .bind(&patient.phone)
        .bind(gender)
        .bind(patient.age as i32)
        .bind(patient.symptoms.join(", "))
        .bind(patient.symptom_duration_hours)
        .bind(vitals)
        .bind(patient.entry_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_available_doctors(&self, department: Department) -> Result<Vec<DoctorRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT doctor_id, name, department, is_busy, busy_from, busy_until
            FROM doctors
            WHERE department = $1 AND is_busy = FALSE
            ORDER BY name
        "#,
        )
        .bind(department.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::doctor_from_row).collect()
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

        let result = sqlx::query(
            r#"
            UPDATE doctors
            SET is_busy = TRUE, busy_from = $2, busy_until = $3
            WHERE doctor_id = $1 AND is_busy = FALSE
        "#,
        )
        .bind(id)
        .bind(busy_from)
        .bind(busy_until)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_doctor(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE doctors
            SET is_busy = FALSE, busy_from = NULL, busy_until = NULL
            WHERE doctor_id = $1
        "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(HmsError::NotFound(format!("doctor {} not found", id)));
        }
        Ok(())
    }

    async fn list_available_beds(&self, category: BedCategory) -> Result<Vec<BedRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT room_number, category, is_occupied
            FROM rooms
            WHERE category = $1 AND is_occupied = FALSE
            ORDER BY room_number
        "#,
        )
        .bind(category.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(BedRecord {
                    id: row.try_get("room_number").map_err(db_err)?,
                    category: row
                        .try_get::<String, _>("category")
                        .map_err(db_err)?
                        .parse()?,
                    is_occupied: row.try_get("is_occupied").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn reserve_bed(&self, id: i32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rooms SET is_occupied = TRUE
            WHERE room_number = $1 AND is_occupied = FALSE
        "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_bed(&self, id: i32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE rooms SET is_occupied = FALSE WHERE room_number = $1
        "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(HmsError::NotFound(format!("bed {} not found", id)));
        }
        Ok(())
    }

    async fn insert_case(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        bed_id: i32,
    ) -> Result<OngoingCase> {
        let case = OngoingCase {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            bed_id,
            opened_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO ongoing_cases (case_id, patient_id, doctor_id, room_number, opened_at)
            VALUES ($1, $2, $3, $4, $5)
        "#,
        )
        .bind(case.id)
        .bind(case.patient_id)
        .bind(case.doctor_id)
        .bind(case.bed_id)
        .bind(case.opened_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(case)
    }

    async fn enqueue(
        &self,
        patient_id: Uuid,
        priority_score: f64,
        category: BedCategory,
    ) -> Result<bool> {
        // 主键冲突时什么都不做，保留更早的条目
        let result = sqlx::query(
            r#"
            INSERT INTO queue (patient_id, priority_score, preferred_category, enqueued_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (patient_id) DO NOTHING
        "#,
        )
        .bind(patient_id)
        .bind(priority_score)
        .bind(category.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn queue_snapshot(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT patient_id, priority_score, preferred_category, enqueued_at
            FROM queue
            ORDER BY priority_score DESC, enqueued_at ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(QueueEntry {
                    patient_id: row.try_get("patient_id").map_err(db_err)?,
                    priority_score: row.try_get("priority_score").map_err(db_err)?,
                    preferred_category: row
                        .try_get::<String, _>("preferred_category")
                        .map_err(db_err)?
                        .parse()?,
                    enqueued_at: row.try_get("enqueued_at").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn release_expired_doctors(&self, now: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query(
            r#"
            UPDATE doctors
            SET is_busy = FALSE, busy_from = NULL, busy_until = NULL
            WHERE is_busy = TRUE AND busy_until <= $1
        "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }

    async fn doctor_status(&self) -> Result<Vec<DoctorStatusView>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (d.doctor_id)
                d.doctor_id, d.name, d.department, d.is_busy, d.busy_from, d.busy_until,
                (CASE WHEN d.is_busy THEN p.name ELSE NULL END) AS patient_name,
                (CASE WHEN d.is_busy
                      THEN CAST(ROUND(CAST(EXTRACT(EPOCH FROM (d.busy_until - NOW())) / 60 AS NUMERIC), 2) AS DOUBLE PRECISION)
                      ELSE NULL END) AS time_remaining
            FROM doctors d
            LEFT JOIN ongoing_cases oc ON oc.doctor_id = d.doctor_id
            LEFT JOIN patient_info p ON p.patient_id = oc.patient_id
            ORDER BY d.doctor_id, oc.opened_at DESC
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut views = rows
            .iter()
            .map(|row| {
                let doctor = Self::doctor_from_row(row)?;
                let time_remaining: Option<f64> =
                    row.try_get("time_remaining").map_err(db_err)?;
                Ok(DoctorStatusView {
                    doctor_id: doctor.id,
                    name: doctor.name,
                    department: doctor.department,
                    status: if doctor.is_busy {
                        DoctorAvailability::Busy
                    } else {
                        DoctorAvailability::Available
                    },
                    with_patient: row.try_get("patient_name").map_err(db_err)?,
                    time_remaining_minutes: time_remaining,
                    busy_from: doctor.busy_from,
                    busy_until: doctor.busy_until,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        views.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(views)
    }

    async fn bed_census(&self) -> Result<Vec<BedCensusRow>> {
        let rows = sqlx::query(
            r#"
            SELECT category,
                   COUNT(*) FILTER (WHERE is_occupied = FALSE) AS available,
                   COUNT(*) FILTER (WHERE is_occupied = TRUE) AS occupied
            FROM rooms
            GROUP BY category
            ORDER BY category
        "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(BedCensusRow {
                    category: row
                        .try_get::<String, _>("category")
                        .map_err(db_err)?
                        .parse()?,
                    available: row.try_get::<i64, _>("available").map_err(db_err)? as usize,
                    occupied: row.try_get::<i64, _>("occupied").map_err(db_err)? as usize,
                })
            })
            .collect()
    }
}

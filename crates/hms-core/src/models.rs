//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::HmsError;

/// 性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// 血压读数
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: u32,  // 收缩压 mmHg
    pub diastolic: u32, // 舒张压 mmHg
}

/// 生命体征
///
/// 缺失的读数在评分和分类时使用默认值 (HR 80, BP 120/80)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub heart_rate: Option<u32>,
    pub blood_pressure: Option<BloodPressure>,
}

impl Vitals {
    pub const DEFAULT_HEART_RATE: u32 = 80;
    pub const DEFAULT_SYSTOLIC: u32 = 120;
    pub const DEFAULT_DIASTOLIC: u32 = 80;

    pub fn heart_rate_or_default(&self) -> u32 {
        self.heart_rate.unwrap_or(Self::DEFAULT_HEART_RATE)
    }

    pub fn systolic_or_default(&self) -> u32 {
        self.blood_pressure
            .map(|bp| bp.systolic)
            .unwrap_or(Self::DEFAULT_SYSTOLIC)
    }

    pub fn diastolic_or_default(&self) -> u32 {
        self.blood_pressure
            .map(|bp| bp.diastolic)
            .unwrap_or(Self::DEFAULT_DIASTOLIC)
    }
}

/// 患者情绪状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Calm,       // 平静
    Frustrated, // 沮丧
    Anxious,    // 焦虑
    Stressed,   // 紧张
    Confused,   // 迷茫
    Panicked,   // 恐慌
}

impl Mood {
    /// 情绪对应的表情符号，用于事件日志
    pub fn emoji(&self) -> &'static str {
        match self {
            Mood::Calm => "😌",
            Mood::Frustrated => "😖",
            Mood::Anxious => "😥",
            Mood::Stressed => "😧",
            Mood::Confused => "😵‍💫",
            Mood::Panicked => "🫨",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mood::Calm => "calm",
            Mood::Frustrated => "frustrated",
            Mood::Anxious => "anxious",
            Mood::Stressed => "stressed",
            Mood::Confused => "confused",
            Mood::Panicked => "panicked",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Mood {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "calm" => Ok(Mood::Calm),
            "frustrated" => Ok(Mood::Frustrated),
            "anxious" => Ok(Mood::Anxious),
            "stressed" => Ok(Mood::Stressed),
            "confused" => Ok(Mood::Confused),
            "panicked" => Ok(Mood::Panicked),
            other => Err(HmsError::Validation(format!("unknown mood: {}", other))),
        }
    }
}

/// 科室枚举，分类器只允许返回这个固定集合中的科室
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Department {
    Cardiology, // 心内科
    Pediatrics, // 儿科
    Neurology,  // 神经科
    Dentist,    // 口腔科
}

impl Department {
    pub const ALL: [Department; 4] = [
        Department::Cardiology,
        Department::Pediatrics,
        Department::Neurology,
        Department::Dentist,
    ];
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Department::Cardiology => "Cardiology",
            Department::Pediatrics => "Pediatrics",
            Department::Neurology => "Neurology",
            Department::Dentist => "Dentist",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Department {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Cardiology" => Ok(Department::Cardiology),
            "Pediatrics" => Ok(Department::Pediatrics),
            "Neurology" => Ok(Department::Neurology),
            "Dentist" => Ok(Department::Dentist),
            other => Err(HmsError::Validation(format!(
                "unknown department: {}",
                other
            ))),
        }
    }
}

/// 床位类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BedCategory {
    Icu,       // 重症监护
    Emergency, // 急诊
    Ward,      // 病房
    Normal,    // 普通
}

impl BedCategory {
    /// 根据分诊等级推导床位类别的尝试顺序
    ///
    /// 分诊等级未定时落入默认分支 [Normal, Ward, Emergency]
    pub fn preference_for(triage_level: Option<u8>) -> &'static [BedCategory] {
        match triage_level {
            Some(5) => &[BedCategory::Icu, BedCategory::Emergency],
            Some(3) | Some(4) => &[BedCategory::Ward, BedCategory::Emergency],
            _ => &[BedCategory::Normal, BedCategory::Ward, BedCategory::Emergency],
        }
    }
}

impl fmt::Display for BedCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BedCategory::Icu => "ICU",
            BedCategory::Emergency => "Emergency",
            BedCategory::Ward => "Ward",
            BedCategory::Normal => "Normal",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for BedCategory {
    type Err = HmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ICU" => Ok(BedCategory::Icu),
            "Emergency" => Ok(BedCategory::Emergency),
            "Ward" => Ok(BedCategory::Ward),
            "Normal" => Ok(BedCategory::Normal),
            other => Err(HmsError::Validation(format!(
                "unknown bed category: {}",
                other
            ))),
        }
    }
}

/// 患者入院登记表
///
/// 外部提交的原始临床数据，进入流水线前转换为 PatientRecord
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIntake {
    pub name: String,
    pub email: String,
    pub gender: Gender,
    pub age: u32,
    pub symptoms: Vec<String>,
    pub symptom_duration_hours: f64,
    #[serde(default)]
    pub vitals: Vitals,
}

/// 患者记录
///
/// 流水线的处理对象。派生字段 (mood/triage_level/department/assigned_*)
/// 只允许在对应阶段成功后写入，补偿时随资源释放一起清空。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub gender: Gender,
    pub age: u32,
    pub symptoms: Vec<String>,
    pub symptom_duration_hours: f64,
    pub vitals: Vitals,
    pub mood: Option<Mood>,
    pub triage_level: Option<u8>,
    pub department: Option<Department>,
    pub assigned_doctor: Option<Uuid>,
    pub assigned_doctor_name: Option<String>,
    pub assigned_bed: Option<i32>,
    pub priority_score: f64,
    pub entry_time: DateTime<Utc>,
    pub treatment_completed: bool,
    pub treatment_end: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// 从入院登记表创建新的患者记录
    pub fn from_intake(intake: PatientIntake) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: intake.name,
            email: intake.email,
            phone: None,
            gender: intake.gender,
            age: intake.age,
            symptoms: intake.symptoms,
            symptom_duration_hours: intake.symptom_duration_hours,
            vitals: intake.vitals,
            mood: None,
            triage_level: None,
            department: None,
            assigned_doctor: None,
            assigned_doctor_name: None,
            assigned_bed: None,
            priority_score: 0.0,
            entry_time: Utc::now(),
            treatment_completed: false,
            treatment_end: None,
        }
    }

    /// 重新计算并写回优先级分数
    pub fn recalculate_priority(&mut self) {
        self.priority_score = crate::priority::score(self);
    }

    /// 清空医生指派字段，与资源释放一起调用
    pub fn clear_doctor_assignment(&mut self) {
        self.assigned_doctor = None;
        self.assigned_doctor_name = None;
    }

    /// 清空床位指派字段，与资源释放一起调用
    pub fn clear_bed_assignment(&mut self) {
        self.assigned_bed = None;
    }
}

/// 医生记录
///
/// 不变式: is_busy=true 当且仅当 busy_until 已设置且晚于 busy_from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorRecord {
    pub id: Uuid,
    pub name: String,
    pub department: Department,
    pub is_busy: bool,
    pub busy_from: Option<DateTime<Utc>>,
    pub busy_until: Option<DateTime<Utc>>,
}

impl DoctorRecord {
    pub fn new(name: impl Into<String>, department: Department) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            department,
            is_busy: false,
            busy_from: None,
            busy_until: None,
        }
    }
}

/// 床位记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedRecord {
    pub id: i32, // 房间号
    pub category: BedCategory,
    pub is_occupied: bool,
}

impl BedRecord {
    pub fn new(id: i32, category: BedCategory) -> Self {
        Self {
            id,
            category,
            is_occupied: false,
        }
    }
}

/// 等待队列条目
///
/// 排序键为 (priority_score 降序, enqueued_at 升序)，保证出队顺序确定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub patient_id: Uuid,
    pub priority_score: f64,
    pub preferred_category: BedCategory,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    /// 队列排序比较：分数高者在前，分数相同时先入队者在前
    pub fn cmp_priority(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority_score
            .partial_cmp(&self.priority_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
    }
}

/// 在诊病例，患者、医生、床位三方预定都成功后建立
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OngoingCase {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub bed_id: i32,
    pub opened_at: DateTime<Utc>,
}

/// 流水线阶段，声明顺序即执行顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    MoodAnalyzer,
    EmergencyTriage,
    DoctorScheduler,
    BedManager,
    ConflictResolver,
}

impl Stage {
    /// 固定的流水线拓扑
    pub const PIPELINE: [Stage; 5] = [
        Stage::MoodAnalyzer,
        Stage::EmergencyTriage,
        Stage::DoctorScheduler,
        Stage::BedManager,
        Stage::ConflictResolver,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::MoodAnalyzer => "MoodAnalyzer",
            Stage::EmergencyTriage => "EmergencyTriage",
            Stage::DoctorScheduler => "DoctorScheduler",
            Stage::BedManager => "BedManager",
            Stage::ConflictResolver => "ConflictResolver",
        };
        write!(f, "{}", name)
    }
}

/// 阶段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending, // 待处理
    Success, // 成功
    Failed,  // 失败
    Queued,  // 已排队
}

//! # HMS Workflow
//!
//! 入院编排流水线。固定拓扑：情绪分析 → 分诊 → 医生排班 → 床位分配 →
//! 冲突解决。医生池和床位池是两个独立资源，跨池没有两阶段提交；
//! 只拿到其中一个时由冲突解决阶段先补偿释放、再把患者放入等待队列。

pub mod beds;
pub mod context;
pub mod pipeline;
pub mod projection;
pub mod resolver;
pub mod scheduler;
pub mod selector;

pub use beds::BedManager;
pub use context::{AdmissionContext, ReservedBed, ReservedDoctor, ScratchCache};
pub use pipeline::{AdmissionOutcome, AdmissionPipeline, AdmissionResult};
pub use projection::PatientSummary;
pub use resolver::{ConflictResolver, Resolution};
pub use scheduler::{block_duration_minutes, DoctorScheduler};
pub use selector::{DoctorSelector, FirstAvailableSelector, RandomSelector, RoundRobinSelector};

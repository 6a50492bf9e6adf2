//! # HMS Store
//!
//! 医生、床位、病例和等待队列的持久层。核心只依赖 AdmissionStore
//! 接口列出的操作；每个写操作各自原子，跨操作不假设事务。

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use store::{AdmissionStore, BedCensusRow, DoctorAvailability, DoctorStatusView};

//! 并发争用演示程序
//!
//! 多个入院尝试同时争抢同一位医生和同一张床。预定是原子的
//! 读-改-写，两个尝试绝不会同时拿到同一个资源；抢输的一方
//! 走补偿加入队的恢复路径。

use hms_classifier::RuleClassifier;
use hms_core::{BedCategory, BedRecord, Department, DoctorRecord, Gender, PatientIntake, Vitals};
use hms_store::{AdmissionStore, MemoryStore};
use hms_workflow::{AdmissionOutcome, AdmissionPipeline, RandomSelector};
use std::sync::Arc;

fn intake(name: &str, email: &str) -> PatientIntake {
    PatientIntake {
        name: name.to_string(),
        email: email.to_string(),
        gender: Gender::Other,
        age: 52,
        symptoms: vec!["chest pain".to_string()],
        symptom_duration_hours: 4.0,
        vitals: Vitals::default(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("⚔️ 资源争用演示：三位患者，一位医生，一张床\n");

    let store = Arc::new(MemoryStore::new());
    store
        .add_doctor(DoctorRecord::new("Dr. Chen", Department::Cardiology))
        .await;
    store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;

    let pipeline = Arc::new(AdmissionPipeline::with_selector(
        store.clone(),
        Arc::new(RuleClassifier::new()),
        Arc::new(RandomSelector),
    ));

    let attempts = vec![
        ("Aiko", "aiko@example.com"),
        ("Bruno", "bruno@example.com"),
        ("Chloe", "chloe@example.com"),
    ];

    let mut handles = Vec::new();
    for (name, email) in attempts {
        let pipeline = pipeline.clone();
        let form = intake(name, email);
        handles.push(tokio::spawn(async move { (name, pipeline.admit(form).await) }));
    }

    let mut admitted = 0;
    let mut queued = 0;
    for handle in handles {
        let (name, result) = handle.await?;
        match result {
            Ok(result) => {
                let label = match result.outcome {
                    AdmissionOutcome::Admitted => {
                        admitted += 1;
                        "admitted"
                    }
                    AdmissionOutcome::Queued => {
                        queued += 1;
                        "queued"
                    }
                    AdmissionOutcome::Rejected => "rejected",
                };
                println!("   {:<8} -> {}", name, label);
            }
            // 预定被并发抢走时该尝试以冲突错误结束，资源已补偿归还
            Err(e) => println!("   {:<8} -> aborted ({})", name, e),
        }
    }

    println!("\n   admitted: {}, queued: {}", admitted, queued);
    println!("\n📊 终局资源池:");
    for row in store.bed_census().await? {
        println!(
            "   {}: {} 空闲 / {} 占用",
            row.category, row.available, row.occupied
        );
    }
    for entry in store.queue_snapshot().await? {
        println!("   queue: {} (score {})", entry.patient_id, entry.priority_score);
    }

    Ok(())
}

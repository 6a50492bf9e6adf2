//! 入院流水线演示程序
//!
//! 展示三种典型结局：双资源到手建病例、单边资源短缺补偿后入队、
//! 双资源短缺终态失败。分类器使用离线规则实现，结果可复现。

use hms_classifier::RuleClassifier;
use hms_core::{BedCategory, BedRecord, Department, DoctorRecord, Gender, PatientIntake, Vitals};
use hms_store::{AdmissionStore, MemoryStore};
use hms_workflow::{AdmissionOutcome, AdmissionPipeline, FirstAvailableSelector};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🏥 入院编排流水线演示\n");

    // 1. 初始化资源池：一位心内科医生，急诊床一张，普通床一张。
    //    没有 ICU 床，也没有神经科医生。
    let store = Arc::new(MemoryStore::new());
    store
        .add_doctor(DoctorRecord::new("Dr. Chen", Department::Cardiology))
        .await;
    store.add_bed(BedRecord::new(501, BedCategory::Emergency)).await;
    store.add_bed(BedRecord::new(101, BedCategory::Normal)).await;
    println!("✅ 资源池就绪：1 位医生，2 张床");

    let pipeline = AdmissionPipeline::with_selector(
        store.clone(),
        Arc::new(RuleClassifier::new()),
        Arc::new(FirstAvailableSelector),
    );

    // 2. 场景一：危重心脏病患者。等级 5 找不到 ICU 床，回退到急诊床，
    //    医生和床位都到手，直接建病例。
    let critical = PatientIntake {
        name: "Elena Vasquez".to_string(),
        email: "elena@example.com".to_string(),
        gender: Gender::Female,
        age: 67,
        symptoms: vec!["cardiac arrest".to_string()],
        symptom_duration_hours: 0.5,
        vitals: Vitals {
            heart_rate: Some(132),
            blood_pressure: Some(hms_core::BloodPressure {
                systolic: 165,
                diastolic: 95,
            }),
        },
    };
    run_and_report(&pipeline, critical).await?;

    // 3. 场景二：神经科患者。科室没有医生，普通床先到手再被释放，
    //    患者带着优先级分数进入等待队列。
    let neuro = PatientIntake {
        name: "Marcus Webb".to_string(),
        email: "marcus@example.com".to_string(),
        gender: Gender::Male,
        age: 41,
        symptoms: vec!["headache".to_string()],
        symptom_duration_hours: 6.0,
        vitals: Vitals::default(),
    };
    run_and_report(&pipeline, neuro).await?;

    // 4. 场景三：床位已在场景一被占用，医生也不空闲，双失败终态。
    let late = PatientIntake {
        name: "Noor Rahman".to_string(),
        email: "noor@example.com".to_string(),
        gender: Gender::Other,
        age: 29,
        symptoms: vec!["chest pain".to_string()],
        symptom_duration_hours: 2.0,
        vitals: Vitals {
            heart_rate: Some(118),
            blood_pressure: None,
        },
    };
    run_and_report(&pipeline, late).await?;

    // 5. 汇总读模型
    println!("\n📊 医生状态:");
    for view in store.doctor_status().await? {
        println!(
            "   {} ({}) - {:?}",
            view.name,
            view.department,
            view.status
        );
    }

    println!("\n🛏️ 床位统计:");
    for row in store.bed_census().await? {
        println!(
            "   {}: {} 空闲 / {} 占用",
            row.category, row.available, row.occupied
        );
    }

    println!("\n⏳ 等待队列:");
    for entry in store.queue_snapshot().await? {
        println!(
            "   {} (score {}, wants {})",
            entry.patient_id, entry.priority_score, entry.preferred_category
        );
    }

    Ok(())
}

async fn run_and_report(
    pipeline: &AdmissionPipeline,
    intake: PatientIntake,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = intake.name.clone();
    println!("\n📋 处理入院申请: {}", name);

    let result = pipeline.admit(intake).await?;
    for line in &result.logs {
        println!("   {}", line);
    }

    let outcome = match result.outcome {
        AdmissionOutcome::Admitted => "✅ 已收治（病例建立）",
        AdmissionOutcome::Queued => "🕐 已入队（资源就绪后再收治）",
        AdmissionOutcome::Rejected => "❌ 无资源可用（请就近转院）",
    };
    println!("   结局: {}", outcome);
    Ok(())
}

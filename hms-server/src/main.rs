//! 入院编排服务主程序
//!
//! 读取入院登记 JSON，逐个跑入院流水线，输出每次尝试的事件日志、
//! 阶段状态和患者摘要，最后打印医生状态与床位统计两个读模型。

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use hms_classifier::{Classifier, LlmClassifier, LlmClassifierConfig, RuleClassifier};
use hms_core::{BedRecord, DoctorRecord, PatientIntake};
use hms_store::{AdmissionStore, MemoryStore};
use hms_workflow::{
    AdmissionOutcome, AdmissionPipeline, DoctorSelector, FirstAvailableSelector, RandomSelector,
    RoundRobinSelector,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{ClassifierMode, HmsConfig, StoreBackend};

/// 入院编排服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "hms-server")]
#[command(about = "智能医院入院编排服务")]
struct Args {
    /// 入院登记文件（PatientIntake 的 JSON 数组）
    #[arg(short, long, default_value = "./data/intake.json")]
    intake: String,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动入院编排服务...");

    let config = HmsConfig::load(args.config.as_deref())?;

    let store = build_store(&config).await?;
    let classifier = build_classifier(&config)?;
    let selector = build_selector(&config)?;
    let pipeline = AdmissionPipeline::with_selector(store.clone(), classifier, selector);

    let intakes = load_intakes(&args.intake)?;
    info!("Loaded {} intake forms from {}", intakes.len(), args.intake);

    for intake in intakes {
        let name = intake.name.clone();
        match pipeline.admit(intake).await {
            Ok(result) => {
                println!("\n=== {} ===", name);
                for line in &result.logs {
                    println!("{}", line);
                }
                for (stage, status) in &result.status {
                    println!("  {:<18} {:?}", stage.to_string(), status);
                }
                let outcome = match result.outcome {
                    AdmissionOutcome::Admitted => "Admitted (case created)",
                    AdmissionOutcome::Queued => "Queued (recovered)",
                    AdmissionOutcome::Rejected => "Rejected (no resources, no queue entry)",
                };
                println!("  Outcome: {}", outcome);
                println!(
                    "  Summary: {}",
                    serde_json::to_string_pretty(&result.summary)?
                );
            }
            Err(e) => {
                // 致命错误已在流水线内部完成补偿
                error!("Admission for {} failed: {}", name, e);
            }
        }
    }

    print_read_models(store.as_ref()).await?;

    Ok(())
}

/// 构建存储后端
async fn build_store(config: &HmsConfig) -> Result<Arc<dyn AdmissionStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            for seed in &config.roster.doctors {
                store
                    .add_doctor(DoctorRecord::new(seed.name.clone(), seed.department))
                    .await;
            }
            for seed in &config.roster.beds {
                store.add_bed(BedRecord::new(seed.room, seed.category)).await;
            }
            info!(
                "Memory store seeded with {} doctors and {} beds",
                config.roster.doctors.len(),
                config.roster.beds.len()
            );
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url missing")?;
            let store = hms_store::PgStore::connect(url, config.store.max_connections).await?;
            store.create_tables().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("this build does not include the postgres backend")
        }
    }
}

/// 构建分类器
fn build_classifier(config: &HmsConfig) -> Result<Arc<dyn Classifier>> {
    match config.classifier.mode {
        ClassifierMode::Rules => {
            warn!("Using offline rule classifier");
            Ok(Arc::new(RuleClassifier::new()))
        }
        ClassifierMode::Llm => {
            let api_key = std::env::var(&config.classifier.api_key_env).with_context(|| {
                format!("environment variable {} not set", config.classifier.api_key_env)
            })?;
            let classifier = LlmClassifier::new(LlmClassifierConfig {
                endpoint: config.classifier.endpoint.clone(),
                model: config.classifier.model.clone(),
                api_key,
                timeout: Duration::from_millis(config.classifier.timeout_ms),
            })?;
            Ok(Arc::new(classifier))
        }
    }
}

/// 构建医生挑选策略
fn build_selector(config: &HmsConfig) -> Result<Arc<dyn DoctorSelector>> {
    let selector: Arc<dyn DoctorSelector> = match config.workflow.selection_strategy.as_str() {
        "random" => Arc::new(RandomSelector),
        "first-available" => Arc::new(FirstAvailableSelector),
        "round-robin" => Arc::new(RoundRobinSelector::default()),
        other => anyhow::bail!("unknown selection strategy: {}", other),
    };
    Ok(selector)
}

/// 读取入院登记文件
fn load_intakes(path: &str) -> Result<Vec<PatientIntake>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read intake file {}", path))?;
    serde_json::from_str(&content).context("intake file is not a valid PatientIntake array")
}

/// 打印聚合读模型
async fn print_read_models(store: &dyn AdmissionStore) -> Result<()> {
    // 先释放忙碌窗口已到期的医生，视图才反映真实可用性
    store.release_expired_doctors(chrono::Utc::now()).await?;

    println!("\n=== Doctor status ===");
    for view in store.doctor_status().await? {
        match view.time_remaining_minutes {
            Some(remaining) => println!(
                "  {:<16} {:<12} {:?} ({}min left, with {})",
                view.name,
                view.department.to_string(),
                view.status,
                remaining,
                view.with_patient.as_deref().unwrap_or("-"),
            ),
            None => println!(
                "  {:<16} {:<12} {:?}",
                view.name,
                view.department.to_string(),
                view.status
            ),
        }
    }

    println!("\n=== Bed census ===");
    for row in store.bed_census().await? {
        println!(
            "  {:<10} available: {:<3} occupied: {}",
            row.category.to_string(),
            row.available,
            row.occupied
        );
    }

    Ok(())
}

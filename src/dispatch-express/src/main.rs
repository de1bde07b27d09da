//! Dispatch Express — scheduled-message delivery engine and sequence stepper.
//!
//! Main entry point that wires the stores, engines, and HTTP trigger
//! endpoint. The engine itself is stateless between trigger invocations;
//! everything durable lives in the stores built here.

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::info;

use dispatch_api::rest::AppState;
use dispatch_api::ApiServer;
use dispatch_channels::{SmtpConfig, SmtpEmailAdapter, TwilioConfig, TwilioSmsAdapter};
use dispatch_core::config::AppConfig;
use dispatch_core::templates::MessageTemplate;
use dispatch_core::types::{
    Channel, DelayFrom, Sequence, SequenceEnrollment, SequenceStep, SkipCondition, StepStatus,
};
use dispatch_engine::{QueueProcessor, SequenceEngine};
use dispatch_store::{
    InMemoryRecordStore, InMemoryTemplateStore, MessageQueue, SendLog, SequenceStore,
};

#[derive(Parser, Debug)]
#[command(name = "dispatch-express")]
#[command(about = "Scheduled-message delivery engine and sequence stepper")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "DISPATCH_EXPRESS__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DISPATCH_EXPRESS__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seed a demo sequence and enrollment for development
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dispatch_express=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Dispatch Express starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        message_batch = config.engine.message_batch_size,
        enrollment_batch = config.engine.enrollment_batch_size,
        "Configuration loaded"
    );

    // Durable tables
    let queue = Arc::new(MessageQueue::new());
    let send_log = Arc::new(SendLog::new());
    let sequences = Arc::new(SequenceStore::new());
    let templates = Arc::new(InMemoryTemplateStore::new());
    let records = Arc::new(InMemoryRecordStore::new());

    // Channel adapters
    let email = Arc::new(SmtpEmailAdapter::new(SmtpConfig::default()));
    let sms = Arc::new(TwilioSmsAdapter::new(TwilioConfig::default()));

    // Engines
    let processor = Arc::new(QueueProcessor::new(
        queue.clone(),
        send_log.clone(),
        email,
        sms,
    ));
    let engine = Arc::new(SequenceEngine::new(
        sequences.clone(),
        queue.clone(),
        templates.clone(),
        records.clone(),
    ));

    if cli.seed_demo {
        seed_demo(&sequences, &templates);
    }

    let state = AppState {
        queue,
        processor,
        sequences: engine,
        auth: Arc::new(config.auth.clone()),
        engine: config.engine.clone(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };

    let server = ApiServer::new(config, state);
    server.start_metrics().await?;
    server.start_http().await?;

    Ok(())
}

/// Seed a two-step onboarding sequence with one enrollment, so a fresh
/// instance has work to do on the first trigger.
fn seed_demo(sequences: &SequenceStore, templates: &InMemoryTemplateStore) {
    info!("Seeding demo sequence");

    let welcome = templates.insert(MessageTemplate::new(
        "welcome_email",
        Channel::Email,
        Some("Welcome, {{first_name}}!"),
        "<p>Hi {{first_name}}, thanks for signing up.</p>",
    ));
    let tips = templates.insert(MessageTemplate::new(
        "tips_email",
        Channel::Email,
        Some("Getting the most out of your account"),
        "<p>Here are three tips, {{first_name}}.</p>",
    ));

    let mut sequence = Sequence::new("Welcome Series");
    let sid = sequence.id;
    sequence.steps.push(SequenceStep {
        sequence_id: sid,
        step_order: 1,
        status: StepStatus::Active,
        channel: Channel::Email,
        template_id: welcome,
        subject_override: None,
        delay_minutes: 0,
        delay_from: DelayFrom::PreviousStep,
        skip_condition: None,
        total_sent: 0,
    });
    sequence.steps.push(SequenceStep {
        sequence_id: sid,
        step_order: 2,
        status: StepStatus::Active,
        channel: Channel::Email,
        template_id: tips,
        subject_override: None,
        delay_minutes: 1440,
        delay_from: DelayFrom::Enrollment,
        skip_condition: Some(SkipCondition {
            table: "account_activity".to_string(),
            user_field: "user_id".to_string(),
            check_field: "onboarded".to_string(),
            check_value: "true".to_string(),
        }),
        total_sent: 0,
    });
    sequences.insert_sequence(sequence);

    let mut enrollment = SequenceEnrollment::new(sid, Some("demo-user"), Some("demo@example.com"));
    enrollment
        .metadata
        .insert("first_name".to_string(), "Demo".to_string());
    sequences.enroll(enrollment);
}

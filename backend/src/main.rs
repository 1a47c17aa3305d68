use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use leadflow_backend::agents::LogOnlyAgentRunner;
use leadflow_backend::config::Config;
use leadflow_backend::database;
use leadflow_backend::jobs::JobScheduler;
use leadflow_backend::services::{
    EmailSender, HttpSmsSender, LogOnlyEmailSender, LogOnlySender, MessageSender, SmtpEmailSender,
};
use leadflow_backend::store::PgStore;
use leadflow_backend::workflows::WorkflowEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    let store = Arc::new(PgStore::new(db_pool));

    let sms: Arc<dyn MessageSender> = if config.sms.is_configured() {
        Arc::new(HttpSmsSender::new(&config.sms)?)
    } else {
        tracing::warn!("SMS provider not configured; send_sms actions will only be logged");
        Arc::new(LogOnlySender)
    };

    let email: Arc<dyn EmailSender> = if config.smtp.is_configured() {
        Arc::new(SmtpEmailSender::new(&config.smtp)?)
    } else {
        tracing::warn!("SMTP not configured; send_email actions will only be logged");
        Arc::new(LogOnlyEmailSender)
    };

    let engine = WorkflowEngine::builder(store.clone(), store.clone())
        .sms_sender(sms)
        .email_sender(email)
        .batch_size(config.engine.poll_batch_size)
        .agents(store, Arc::new(LogOnlyAgentRunner), config.engine.agent_batch_size)
        .build();

    let mut scheduler = JobScheduler::new(engine, config.engine.clone()).await?;
    scheduler.start().await?;

    tracing::info!("LeadFlow workflow engine running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await?;
    tracing::info!("Workflow engine stopped");

    Ok(())
}

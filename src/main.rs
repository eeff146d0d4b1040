use anyhow::{Context, Result};
use docbrief::{api, config, logging, pipeline::SummaryPipeline, staging, summarization};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();
    config::init_config();
    let config = config::get_config();

    staging::ensure_upload_dir(&config.upload_dir).with_context(|| {
        format!(
            "Failed to prepare upload directory {}",
            config.upload_dir.display()
        )
    })?;
    if config.generation_api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; summarization requests will fail");
    }

    let generator = summarization::OpenAiGenerator::new(config.generator_config())
        .context("Failed to build generation client")?;
    let pipeline = SummaryPipeline::new(config.pipeline_settings(), Arc::new(generator));
    let app = api::create_router(Arc::new(pipeline), config.max_upload_bytes);

    let listener = bind_listener(config.server_port)
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        model = %config.generation_model,
        "Listening on http://0.0.0.0:{}",
        config.server_port
    );
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(port: u16) -> Result<TcpListener, std::io::Error> {
    use std::net::Ipv4Addr;

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    tracing::debug!(port, "Bound server port");
    Ok(listener)
}

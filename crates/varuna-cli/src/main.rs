mod cli;
mod config;
mod logger;
mod output;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use varuna_client::ValidationPipeline;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_logger(cli.log_format);

    info!(config = %cli.config.display(), "設定ファイルを読み込みます");
    let cfg = config::load(&cli.config)?;
    cfg.validate()?;

    let settings = cfg.pipeline_settings();
    let service_config = cfg.validation_service_configuration()?;

    let report = ValidationPipeline::new()
        .run(
            &settings,
            Some(&service_config),
            &cli.signature,
            cli.document.as_deref(),
        )
        .await
        .context("署名の検証に失敗しました")?;

    if report.is_empty() {
        warn!(signature = %cli.signature.display(), "レポートは生成されませんでした");
        return Ok(());
    }

    let path = output::report_path(
        cli.output.as_deref(),
        &cfg.output.directory,
        &cli.signature,
        &report,
        chrono::Local::now().naive_local(),
    );
    output::write_report(&path, &report)?;

    Ok(())
}

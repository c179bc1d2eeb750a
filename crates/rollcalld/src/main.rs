use anyhow::{Context, Result};
use rollcall_core::asset::{self, AssetSpec};
use rollcall_core::detector::{backend_available, load_detector};
use rollcall_core::{DetectorError, HttpRecognitionService, Roster};
use rollcall_hw::V4lMediaSource;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use workflow::{DetectorResult, WorkflowDeps, WorkflowSettings};

mod config;
mod dbus_interface;
mod overlay;
mod status;
mod upload;
mod workflow;

const BUS_NAME: &str = "org.rollcall.Kiosk1";
const OBJECT_PATH: &str = "/org/rollcall/Kiosk1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::from_env();

    let roster = match &config.roster_path {
        Some(path) => Roster::load(path)
            .with_context(|| format!("loading roster from {}", path.display()))?,
        None => Roster::seed().context("parsing embedded sample roster")?,
    };
    tracing::info!(students = roster.len(), "roster loaded");

    let service = HttpRecognitionService::new(config.upload_url.clone(), config.upload_timeout())
        .context("building recognition service client")?;
    tracing::info!(endpoint = %config.upload_url, "recognition service configured");

    let media = Arc::new(V4lMediaSource::new(config.camera_device.clone()));
    let loader = load_face_detector(config.cascade_asset(), config.asset_dir.clone());

    let handle = workflow::spawn_workflow(
        WorkflowSettings::from_config(&config),
        WorkflowDeps {
            roster,
            media,
            service: Arc::new(service),
            today: || chrono::Utc::now().date_naive(),
        },
        loader,
    );

    let _conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, dbus_interface::KioskService { workflow: handle })?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}

/// Fetch (or reuse) the classifier asset, then load it on a blocking thread.
async fn load_face_detector(wanted: AssetSpec, dir: PathBuf) -> DetectorResult {
    if !backend_available() {
        tracing::warn!(
            url = %wanted.url,
            "no detection backend compiled in, skipping classifier download"
        );
        return Err(DetectorError::Unsupported.into());
    }
    let client = reqwest::Client::builder()
        .build()
        .map_err(asset::AssetError::from)?;
    let path = asset::resolve(&wanted, &dir, &client).await?;
    tracing::info!(path = %path.display(), "classifier asset ready");

    let detector = tokio::task::spawn_blocking(move || load_detector(&path))
        .await
        .map_err(|e| DetectorError::LoadFailed(e.to_string()))??;
    Ok(detector)
}

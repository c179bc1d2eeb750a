use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::presentation::{ChartData, TableRow};
use rollcall_core::{CapturedImage, FaceRect};
use std::time::Duration;

#[zbus::proxy(
    interface = "org.rollcall.Kiosk1",
    default_service = "org.rollcall.Kiosk1",
    default_path = "/org/rollcall/Kiosk1"
)]
trait Kiosk {
    fn open_camera(&self) -> zbus::Result<String>;
    fn close_camera(&self) -> zbus::Result<bool>;
    fn capture(&self) -> zbus::Result<u32>;
    fn captures(&self) -> zbus::Result<String>;
    fn upload(&self) -> zbus::Result<bool>;
    fn roster(&self) -> zbus::Result<String>;
    fn chart(&self) -> zbus::Result<String>;
    fn overlay(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera
    Open,
    /// Close the camera
    Close,
    /// Capture a still into the upload buffer
    Capture,
    /// List buffered captures awaiting upload
    Captures {
        /// Print each full data URI
        #[arg(short, long)]
        full: bool,
    },
    /// Upload buffered captures for recognition
    Upload {
        /// Wait for the upload to finish and print the outcome
        #[arg(short, long)]
        wait: bool,
    },
    /// Show the attendance table
    Roster,
    /// Show the attendance distribution
    Chart,
    /// Show face boxes from the live overlay
    Overlay,
    /// Show daemon status
    Status,
    /// List V4L2 capture devices (does not need the daemon)
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Devices = cli.command {
        print_devices();
        return Ok(());
    }

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus")?;
    let kiosk = KioskProxy::new(&conn)
        .await
        .context("rollcalld is not reachable")?;
    tracing::debug!("connected to rollcalld");

    match cli.command {
        Commands::Open => {
            let state = kiosk.open_camera().await?;
            println!("camera: {state}");
        }
        Commands::Close => {
            if kiosk.close_camera().await? {
                println!("camera closed");
            } else {
                println!("camera was not open");
            }
        }
        Commands::Capture => {
            let buffered = kiosk.capture().await?;
            println!("{buffered} image(s) buffered");
        }
        Commands::Captures { full } => {
            let images: Vec<CapturedImage> = serde_json::from_str(&kiosk.captures().await?)?;
            print_captures(&images, full);
        }
        Commands::Upload { wait } => {
            if !kiosk.upload().await? {
                println!("nothing uploaded (buffer empty or an upload is already in flight)");
                return Ok(());
            }
            println!("upload started");
            if wait {
                wait_for_upload(&kiosk).await?;
            }
        }
        Commands::Roster => {
            let rows: Vec<TableRow> = serde_json::from_str(&kiosk.roster().await?)?;
            print_roster(&rows);
        }
        Commands::Chart => {
            let chart: ChartData = serde_json::from_str(&kiosk.chart().await?)?;
            for (label, count) in chart.labels.iter().zip(chart.data.iter()) {
                println!("{label:<20} {}", "#".repeat(*count));
            }
        }
        Commands::Overlay => {
            let faces: Vec<FaceRect> = serde_json::from_str(&kiosk.overlay().await?)?;
            if faces.is_empty() {
                println!("no faces");
            }
            for f in faces {
                println!("face at ({}, {}) {}x{}", f.x, f.y, f.width, f.height);
            }
        }
        Commands::Status => {
            let status: serde_json::Value = serde_json::from_str(&kiosk.status().await?)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Devices => print_devices(),
    }

    Ok(())
}

async fn wait_for_upload(kiosk: &KioskProxy<'_>) -> Result<()> {
    loop {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let status: serde_json::Value = serde_json::from_str(&kiosk.status().await?)?;
        if status["upload_in_flight"].as_bool() == Some(true) {
            continue;
        }
        match status["message"]["text"].as_str() {
            Some(text) => println!("{text}"),
            None => println!("upload finished"),
        }
        return Ok(());
    }
}

fn print_captures(images: &[CapturedImage], full: bool) {
    if images.is_empty() {
        println!("no captures buffered");
        return;
    }
    for (i, image) in images.iter().enumerate() {
        let uri = image.as_data_uri();
        if full {
            println!("#{} {uri}", i + 1);
        } else {
            let preview: String = uri.chars().take(48).collect();
            println!("#{:<3} {:>9} bytes  {preview}...", i + 1, image.len());
        }
    }
}

fn print_roster(rows: &[TableRow]) {
    println!(
        "{:<20} {:>6} {:>8} {:>7}  {}",
        "NAME", "TOTAL", "PRESENT", "%", "CALL"
    );
    for row in rows {
        let marker = if row.below_target { "*" } else { " " };
        println!(
            "{:<20} {:>6} {:>8} {:>6}{marker}  {}",
            row.name,
            row.total_hours,
            row.hours_present,
            row.percentage_label,
            row.call_link.as_deref().unwrap_or("-"),
        );
    }
}

fn print_devices() {
    let devices = rollcall_hw::camera::list_devices();
    if devices.is_empty() {
        println!("no V4L2 capture devices found");
        return;
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}

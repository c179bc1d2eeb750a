use crate::workflow::{WorkflowError, WorkflowHandle};
use serde::Serialize;
use zbus::interface;

/// D-Bus interface for the attendance kiosk daemon.
///
/// Bus name: org.rollcall.Kiosk1
/// Object path: /org/rollcall/Kiosk1
pub struct KioskService {
    pub workflow: WorkflowHandle,
}

fn failed(e: WorkflowError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Kiosk1")]
impl KioskService {
    /// Open the camera. Returns the session state: idle, requesting or live.
    async fn open_camera(&self) -> zbus::fdo::Result<String> {
        tracing::info!("open_camera requested");
        let state = self.workflow.open_camera().await.map_err(failed)?;
        Ok(state.as_str().to_string())
    }

    /// Close the camera and stop the overlay.
    async fn close_camera(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("close_camera requested");
        self.workflow.close_camera().await.map_err(failed)
    }

    /// Capture a still into the buffer. Returns the number of buffered images.
    async fn capture(&self) -> zbus::fdo::Result<u32> {
        let buffered = self.workflow.capture().await.map_err(failed)?;
        Ok(u32::try_from(buffered).unwrap_or(u32::MAX))
    }

    /// Buffered stills awaiting upload, as a JSON array of data URIs.
    async fn captures(&self) -> zbus::fdo::Result<String> {
        let images = self.workflow.captures().await.map_err(failed)?;
        to_json(&images)
    }

    /// Upload the buffered batch. Returns true when an upload started.
    async fn upload(&self) -> zbus::fdo::Result<bool> {
        tracing::info!("upload requested");
        self.workflow.upload().await.map_err(failed)
    }

    /// Roster table rows as JSON.
    async fn roster(&self) -> zbus::fdo::Result<String> {
        let rows = self.workflow.roster().await.map_err(failed)?;
        to_json(&rows)
    }

    /// Attendance distribution chart data as JSON.
    async fn chart(&self) -> zbus::fdo::Result<String> {
        let chart = self.workflow.chart().await.map_err(failed)?;
        to_json(&chart)
    }

    /// Latest face boxes from the live overlay as JSON.
    async fn overlay(&self) -> zbus::fdo::Result<String> {
        let faces = self.workflow.overlay().await.map_err(failed)?;
        to_json(&faces)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let report = self.workflow.status().await.map_err(failed)?;
        let mut value = serde_json::to_value(&report)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        value["version"] = serde_json::Value::from(env!("CARGO_PKG_VERSION"));
        Ok(value.to_string())
    }
}

//! Run a full capture cycle against the virtual camera.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc::UnboundedReceiver;
use vidcap_capture_engine::backend::VirtualCameraBackend;
use vidcap_capture_engine::recorder::{DirectoryStorage, EncoderBackend, VirtualEncoderBackend};
use vidcap_capture_engine::{CaptureConfig, CaptureMode, Notification, VideoCapture};
use vidcap_common::config::AppConfig;
use vidcap_geometry::{DisplayRotation, Size};

const STEP_TIMEOUT: Duration = Duration::from_secs(5);
const VIEW: Size = Size::new(1920, 1080);

pub async fn run(
    seconds: f64,
    rotation: u32,
    output: Option<PathBuf>,
    camera: Option<String>,
    gst: bool,
) -> anyhow::Result<()> {
    let mut config = AppConfig::load();
    if let Some(output) = output {
        config.output_dir = output;
    }
    if let Some(camera) = camera {
        config.capture.camera = camera;
    }
    let capture_config = CaptureConfig::from_app_config(&config)?;
    let rotation = DisplayRotation::from_degrees(rotation)?;

    let backend = VirtualCameraBackend::new();
    let encoders = encoder_backend(gst)?;
    let storage = Arc::new(DirectoryStorage::new(&config.output_dir));

    println!("Simulating capture cycle");
    println!("  Camera: {}", capture_config.camera);
    println!("  Encoder: {}", encoders.name());
    println!("  Output: {}", config.output_dir.display());
    println!();

    let mut capture = VideoCapture::new(
        Arc::new(backend.clone()),
        encoders,
        storage,
        capture_config,
    );
    let mut notifications = capture
        .take_notifications()
        .context("notification stream already taken")?;

    capture.activate()?;
    let matrix = capture.surface_available(VIEW, rotation)?;
    println!(
        "Preview transform: [{:.3} {:.3} {:.1}; {:.3} {:.3} {:.1}]",
        matrix.a, matrix.b, matrix.tx, matrix.c, matrix.d, matrix.ty
    );

    let outcome = async {
        next_matching(&mut notifications, |n| {
            matches!(n, Notification::SessionActive { mode: CaptureMode::Preview, .. })
                || matches!(n, Notification::OpenFailed { .. })
        })
        .await?;

        capture.start_recording(rotation)?;
        let started = next_matching(&mut notifications, |n| {
            matches!(
                n,
                Notification::RecordingStarted { .. }
                    | Notification::RecordingFailed { .. }
                    | Notification::SessionConfigureFailed { .. }
            )
        })
        .await?;

        if matches!(started, Notification::RecordingStarted { .. }) {
            tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            capture.stop_recording()?;
            next_matching(&mut notifications, |n| {
                matches!(n, Notification::RecordingStopped(_))
            })
            .await?;
            next_matching(&mut notifications, |n| {
                matches!(n, Notification::SessionActive { mode: CaptureMode::Preview, .. })
            })
            .await?;
        }
        anyhow::Ok(())
    }
    .await;

    capture.deactivate().await?;
    while let Ok(notification) = notifications.try_recv() {
        print_notification(&notification);
    }
    outcome?;

    println!();
    println!("Hardware requests:");
    for command in backend.commands() {
        println!("  {}", serde_json::to_string(&command)?);
    }
    println!(
        "Peak live sessions: {}, devices left open: {}",
        backend.peak_live_sessions(),
        backend.open_device_count()
    );
    Ok(())
}

fn encoder_backend(gst: bool) -> anyhow::Result<Arc<dyn EncoderBackend>> {
    if gst {
        #[cfg(feature = "gst")]
        return Ok(Arc::new(
            vidcap_capture_engine::recorder::gst::GstEncoderBackend,
        ));
        #[cfg(not(feature = "gst"))]
        anyhow::bail!("vidcap was built without the `gst` feature");
    }
    Ok(Arc::new(VirtualEncoderBackend::new()))
}

/// Print notifications until one matches `done`, and return it.
async fn next_matching(
    rx: &mut UnboundedReceiver<Notification>,
    done: impl Fn(&Notification) -> bool,
) -> anyhow::Result<Notification> {
    loop {
        let notification = tokio::time::timeout(STEP_TIMEOUT, rx.recv())
            .await
            .context("timed out waiting for the capture engine")?
            .context("capture engine stopped")?;
        print_notification(&notification);
        if done(&notification) {
            return Ok(notification);
        }
    }
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::CameraOpened {
            camera_id,
            generation,
        } => println!("[opened] camera {camera_id} ({generation})"),
        Notification::OpenFailed { error } => println!("[error] open failed: {error}"),
        Notification::SessionActive {
            mode,
            session,
            sinks,
        } => {
            let sinks = sinks.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            println!("[session] {mode} {session} -> {}", sinks.join(", "));
        }
        Notification::SessionConfigureFailed { mode, error } => {
            println!("[error] {mode} session failed: {error}")
        }
        Notification::RecordingStarted { path } => {
            println!("[recording] started: {}", path.display())
        }
        Notification::RecordingStopped(summary) => println!(
            "[recording] saved {} ({:.2}s, rotation {}°)",
            summary.path.display(),
            summary.duration_secs,
            summary.orientation_hint
        ),
        Notification::RecordingFailed { error } => println!("[warn] recording: {error}"),
        Notification::DeviceLost { error } => println!("[error] device lost: {error}"),
        Notification::CommandFailed { command, error } => {
            println!("[warn] {command}: {error}")
        }
        Notification::CameraClosed => println!("[closed] camera released"),
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use vidcap_capture_engine::backend::{HalCommand, VirtualCameraBackend};
use vidcap_capture_engine::recorder::{
    DirectoryStorage, EncoderCall, StorageProvider, VirtualEncoderBackend,
};
use vidcap_capture_engine::{CaptureConfig, CaptureMode, Notification, SinkKind, VideoCapture};
use vidcap_common::error::VidcapError;
use vidcap_geometry::{DisplayRotation, Size};

const WAIT: Duration = Duration::from_secs(5);
const VIEW: Size = Size::new(1920, 1080);

struct NoStorage;

impl StorageProvider for NoStorage {
    fn output_path(&self, _extension: &str) -> Option<PathBuf> {
        None
    }
}

struct Rig {
    capture: VideoCapture,
    notifications: UnboundedReceiver<Notification>,
    backend: VirtualCameraBackend,
    encoders: VirtualEncoderBackend,
    _dir: tempfile::TempDir,
}

fn rig(backend: VirtualCameraBackend) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(DirectoryStorage::new(dir.path().join("recordings")));
    rig_with_storage(backend, storage, dir)
}

fn rig_with_storage(
    backend: VirtualCameraBackend,
    storage: Arc<dyn StorageProvider>,
    dir: tempfile::TempDir,
) -> Rig {
    let encoders = VirtualEncoderBackend::new();
    let mut capture = VideoCapture::new(
        Arc::new(backend.clone()),
        Arc::new(encoders.clone()),
        storage,
        CaptureConfig::default(),
    );
    let notifications = capture.take_notifications().unwrap();
    Rig {
        capture,
        notifications,
        backend,
        encoders,
        _dir: dir,
    }
}

/// Wait for the first notification `pick` accepts, skipping the rest.
async fn wait_for<T>(
    rx: &mut UnboundedReceiver<Notification>,
    mut pick: impl FnMut(Notification) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            let notification = rx.recv().await.expect("notification channel closed");
            if let Some(found) = pick(notification) {
                return found;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition")
}

async fn session_active(rx: &mut UnboundedReceiver<Notification>, expected: CaptureMode) -> Vec<SinkKind> {
    wait_for(rx, |n| match n {
        Notification::SessionActive { mode, sinks, .. } if mode == expected => Some(sinks),
        _ => None,
    })
    .await
}

#[tokio::test]
async fn preview_record_stop_close_cycle() {
    let mut rig = rig(VirtualCameraBackend::new());
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();

    let sinks = session_active(&mut rig.notifications, CaptureMode::Preview).await;
    assert_eq!(sinks, vec![SinkKind::Preview]);

    rig.capture
        .start_recording(DisplayRotation::Rotation0)
        .unwrap();
    let path = wait_for(&mut rig.notifications, |n| match n {
        Notification::RecordingStarted { path } => Some(path),
        _ => None,
    })
    .await;

    rig.capture.stop_recording().unwrap();
    let summary = wait_for(&mut rig.notifications, |n| match n {
        Notification::RecordingStopped(summary) => Some(summary),
        _ => None,
    })
    .await;
    assert_eq!(summary.path, path);
    assert_eq!(summary.orientation_hint, 90);
    assert!(path.exists());
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("3gp"));

    session_active(&mut rig.notifications, CaptureMode::Preview).await;
    rig.capture.deactivate().await.unwrap();

    // Sessions never overlap: every create follows the previous close.
    let lifecycle: Vec<_> = rig
        .backend
        .commands()
        .into_iter()
        .filter_map(|c| match c {
            HalCommand::CreateSession { session, .. } => Some(("create", session.0)),
            HalCommand::CloseSession { session } => Some(("close", session.0)),
            _ => None,
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            ("create", 1),
            ("close", 1),
            ("create", 2),
            ("close", 2),
            ("create", 3),
            ("close", 3),
        ]
    );
    assert_eq!(rig.backend.peak_live_sessions(), 1);
    assert_eq!(rig.backend.open_device_count(), 0);
    assert!(matches!(
        rig.backend.commands().last(),
        Some(HalCommand::CloseDevice { .. })
    ));
    assert_eq!(rig.encoders.calls().last(), Some(&EncoderCall::Release));
}

#[tokio::test]
async fn unavailable_storage_records_preview_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut rig = rig_with_storage(VirtualCameraBackend::new(), Arc::new(NoStorage), dir);
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;

    rig.capture
        .start_recording(DisplayRotation::Rotation90)
        .unwrap();
    let error = wait_for(&mut rig.notifications, |n| match n {
        Notification::RecordingFailed { error } => Some(error),
        _ => None,
    })
    .await;
    assert!(matches!(error, VidcapError::NotPrepared { .. }));

    let sinks = session_active(&mut rig.notifications, CaptureMode::Record).await;
    assert_eq!(sinks, vec![SinkKind::Preview]);
    assert!(!rig.encoders.calls().contains(&EncoderCall::Start));

    rig.capture.deactivate().await.unwrap();
}

#[tokio::test]
async fn deactivate_while_configuring_fences_late_callback() {
    let mut rig = rig(VirtualCameraBackend::manual());
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();

    let backend = rig.backend.clone();
    wait_until(|| backend.pending_open_count() == 1).await;
    backend.complete_pending_opens();
    wait_until(|| backend.pending_session_count() == 1).await;

    rig.capture.deactivate().await.unwrap();
    assert_eq!(backend.complete_pending_sessions(), 1);

    assert!(!backend
        .commands()
        .iter()
        .any(|c| matches!(c, HalCommand::SetRepeating { .. })));
    assert_eq!(backend.live_session_count(), 0);
    assert_eq!(backend.open_device_count(), 0);
}

#[tokio::test]
async fn deactivate_before_open_completes_releases_late_handle() {
    let mut rig = rig(VirtualCameraBackend::manual());
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();

    let backend = rig.backend.clone();
    wait_until(|| backend.pending_open_count() == 1).await;
    rig.capture.deactivate().await.unwrap();

    backend.complete_pending_opens();
    assert_eq!(backend.open_device_count(), 0);
}

#[tokio::test]
async fn reactivation_reopens_camera() {
    let mut rig = rig(VirtualCameraBackend::new());
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    rig.capture.activate().unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;

    rig.capture.deactivate().await.unwrap();
    wait_for(&mut rig.notifications, |n| {
        matches!(n, Notification::CameraClosed).then_some(())
    })
    .await;
    assert!(!rig.capture.is_active());
    assert_eq!(rig.backend.open_device_count(), 0);

    rig.capture.activate().unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;
    assert_eq!(rig.backend.open_device_count(), 1);
    rig.capture.deactivate().await.unwrap();
}

#[tokio::test]
async fn disconnect_requires_fresh_open() {
    let mut rig = rig(VirtualCameraBackend::new());
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;

    rig.backend.disconnect();
    let error = wait_for(&mut rig.notifications, |n| match n {
        Notification::DeviceLost { error } => Some(error),
        _ => None,
    })
    .await;
    assert!(error.is_fatal_for_device());
    assert_eq!(rig.backend.open_device_count(), 0);

    rig.capture.open_camera().unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;
    rig.capture.deactivate().await.unwrap();
}

#[tokio::test]
async fn surface_callbacks_resume_preview_and_reopen_lost_device() {
    let mut rig = rig(VirtualCameraBackend::new());
    rig.capture.activate().unwrap();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;

    rig.capture.surface_destroyed();
    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;
    let created = rig
        .backend
        .commands()
        .iter()
        .filter(|c| matches!(c, HalCommand::CreateSession { .. }))
        .count();
    assert_eq!(created, 2);
    assert_eq!(rig.backend.open_device_count(), 1);

    rig.backend.disconnect();
    wait_for(&mut rig.notifications, |n| {
        matches!(n, Notification::DeviceLost { .. }).then_some(())
    })
    .await;
    assert_eq!(rig.backend.open_device_count(), 0);

    rig.capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    session_active(&mut rig.notifications, CaptureMode::Preview).await;
    assert_eq!(rig.backend.open_device_count(), 1);
    rig.capture.deactivate().await.unwrap();
}

#[tokio::test]
async fn surface_callbacks_return_display_transform() {
    let rig = rig(VirtualCameraBackend::new());
    let upright = rig
        .capture
        .surface_available(VIEW, DisplayRotation::Rotation0)
        .unwrap();
    assert!(upright.is_identity());

    let sideways = rig
        .capture
        .surface_size_changed(VIEW, DisplayRotation::Rotation90)
        .unwrap();
    let (x, y) = sideways.map_point(0.0, 0.0);
    assert!((x - 0.0).abs() < 1e-6);
    assert!((y - 1260.0).abs() < 1e-6);

    rig.capture.surface_destroyed();
    assert!(!rig.capture.preview().is_available());
}

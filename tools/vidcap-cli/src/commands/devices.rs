//! List camera devices.

use vidcap_capture_engine::backend::{CameraBackend, VirtualCameraBackend};

pub fn run(json: bool) -> anyhow::Result<()> {
    let backend = VirtualCameraBackend::new();
    let devices = backend.list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    println!("Cameras ({} backend):", backend.name());
    for device in &devices {
        println!(
            "  {:<6} {:<9} sensor {}°",
            device.id,
            format!("{:?}", device.facing).to_lowercase(),
            device.sensor_orientation_degrees
        );
    }
    Ok(())
}

//! Print orientation hint tables.

use vidcap_geometry::{orientation_hint, DisplayRotation, SensorOrientation};

pub fn run() -> anyhow::Result<()> {
    println!("Orientation hints (degrees)");
    println!("{}", "=".repeat(44));
    println!("{:<10} {:>7} {:>7} {:>7} {:>7}", "sensor", "0°", "90°", "180°", "270°");

    for sensor in [SensorOrientation::Default, SensorOrientation::Inverse] {
        let row = DisplayRotation::ALL
            .iter()
            .map(|rotation| format!("{:>7}", orientation_hint(sensor, *rotation)))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{:<10} {row}", format!("{}°", sensor.degrees()));
    }
    Ok(())
}

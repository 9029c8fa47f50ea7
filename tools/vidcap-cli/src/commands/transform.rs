//! Print a preview display transform.

use vidcap_common::config::AppConfig;
use vidcap_geometry::{preview_transform, DisplayRotation, Rect, Size};

pub fn run(
    width: u32,
    height: u32,
    rotation: u32,
    buffer_width: Option<u32>,
    buffer_height: Option<u32>,
) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let view = Size::new(width, height);
    let buffer = Size::new(
        buffer_width.unwrap_or(config.capture.preview_width),
        buffer_height.unwrap_or(config.capture.preview_height),
    );
    let rotation = DisplayRotation::from_degrees(rotation)?;
    let matrix = preview_transform(view, buffer, rotation)?;

    println!(
        "View {}x{}, buffer {}x{}, rotation {}°",
        view.width,
        view.height,
        buffer.width,
        buffer.height,
        rotation.degrees()
    );
    println!("  [{:>10.4} {:>10.4} {:>10.4}]", matrix.a, matrix.b, matrix.tx);
    println!("  [{:>10.4} {:>10.4} {:>10.4}]", matrix.c, matrix.d, matrix.ty);
    if matrix.is_identity() {
        println!("  (identity)");
    }

    let mapped = matrix.map_rect(&Rect::from_size(width as f64, height as f64));
    println!(
        "View bounds map to ({:.1}, {:.1}) - ({:.1}, {:.1})",
        mapped.left, mapped.top, mapped.right, mapped.bottom
    );
    Ok(())
}

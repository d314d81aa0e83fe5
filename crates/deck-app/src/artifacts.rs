//! Output file naming for screenshots and recordings

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use deck_core::DeviceContext;

pub const SCREENSHOT_EXTENSION: &str = "png";
pub const RECORDING_EXTENSION: &str = "mp4";

/// `<dir>/<display name>_<YYYYmmdd_HHMMSS_mmm>.<ext>`
pub fn artifact_path(
    dir: &Path,
    ctx: &DeviceContext,
    at: DateTime<Local>,
    extension: &str,
) -> PathBuf {
    dir.join(format!(
        "{}_{}.{}",
        sanitize(ctx.display_name()),
        at.format("%Y%m%d_%H%M%S_%3f"),
        extension
    ))
}

/// Keep names portable: anything outside `[A-Za-z0-9._-]` becomes `_`
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "device".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use deck_core::Device;

    #[test]
    fn test_artifact_path_format() {
        let ctx = DeviceContext::new(Device::new("emulator-5554"));
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let path = artifact_path(Path::new("/shots"), &ctx, at, SCREENSHOT_EXTENSION);

        assert_eq!(
            path,
            PathBuf::from("/shots/emulator-5554_20240309_140507_000.png")
        );
    }

    #[test]
    fn test_display_name_is_sanitized() {
        let ctx =
            DeviceContext::new(Device::new("192.168.0.5:5555")).with_display_name("Mia's Pixel/8");
        let at = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let path = artifact_path(Path::new("out"), &ctx, at, RECORDING_EXTENSION);
        let name = path.file_name().unwrap().to_str().unwrap();

        assert!(name.starts_with("Mia_s_Pixel_8_"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_sanitize_never_empty() {
        assert_eq!(sanitize(".."), "device");
        assert_eq!(sanitize("ok-name_1"), "ok-name_1");
    }
}

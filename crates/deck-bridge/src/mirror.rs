//! scrcpy and screencap command lines

use std::path::Path;

/// Options applied to a mirror window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorOptions {
    /// Custom window title (scrcpy defaults to the device model)
    pub window_title: Option<String>,

    /// Limit both width and height to this value, keeping the aspect ratio
    pub max_size: Option<u32>,

    pub always_on_top: bool,

    /// Extra flags passed through verbatim
    pub extra_args: Vec<String>,
}

impl MirrorOptions {
    pub fn with_window_title(mut self, title: impl Into<String>) -> Self {
        self.window_title = Some(title.into());
        self
    }

    pub fn with_max_size(mut self, max_size: Option<u32>) -> Self {
        self.max_size = max_size;
        self
    }
}

/// `scrcpy` arguments for a mirror session on `serial`
pub fn mirror_args(serial: &str, options: &MirrorOptions) -> Vec<String> {
    let mut args = vec!["-s".to_string(), serial.to_string()];

    if let Some(title) = &options.window_title {
        args.push("--window-title".to_string());
        args.push(title.clone());
    }

    if let Some(max_size) = options.max_size {
        args.push("--max-size".to_string());
        args.push(max_size.to_string());
    }

    if options.always_on_top {
        args.push("--always-on-top".to_string());
    }

    args.extend(options.extra_args.iter().cloned());
    args
}

/// `scrcpy` arguments for a window-less recorder writing to `path`
pub fn recording_args(serial: &str, path: &Path) -> Vec<String> {
    vec![
        "-s".to_string(),
        serial.to_string(),
        "--no-playback".to_string(),
        "--record".to_string(),
        path.display().to_string(),
    ]
}

/// `adb` arguments that stream a PNG screenshot to stdout
pub fn screenshot_args(serial: &str) -> Vec<String> {
    vec![
        "-s".to_string(),
        serial.to_string(),
        "exec-out".to_string(),
        "screencap".to_string(),
        "-p".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mirror_args_minimal() {
        let args = mirror_args("emulator-5554", &MirrorOptions::default());
        assert_eq!(args, vec!["-s", "emulator-5554"]);
    }

    #[test]
    fn test_mirror_args_with_options() {
        let options = MirrorOptions {
            window_title: Some("Pixel 8".to_string()),
            max_size: Some(1024),
            always_on_top: true,
            extra_args: vec!["--turn-screen-off".to_string()],
        };

        let args = mirror_args("abc", &options);

        assert_eq!(
            args,
            vec![
                "-s",
                "abc",
                "--window-title",
                "Pixel 8",
                "--max-size",
                "1024",
                "--always-on-top",
                "--turn-screen-off"
            ]
        );
    }

    #[test]
    fn test_builders() {
        let options = MirrorOptions::default()
            .with_window_title("Work")
            .with_max_size(Some(800));
        assert_eq!(options.window_title.as_deref(), Some("Work"));
        assert_eq!(options.max_size, Some(800));
    }

    #[test]
    fn test_recording_args() {
        let path = PathBuf::from("/tmp/rec.mp4");
        let args = recording_args("abc", &path);
        assert_eq!(
            args,
            vec!["-s", "abc", "--no-playback", "--record", "/tmp/rec.mp4"]
        );
    }

    #[test]
    fn test_screenshot_args() {
        assert_eq!(
            screenshot_args("abc"),
            vec!["-s", "abc", "exec-out", "screencap", "-p"]
        );
    }
}

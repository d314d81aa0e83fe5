//! Tool availability checking
//!
//! This module checks that the two external tools the deck drives are
//! installed: `adb` (device discovery, screenshots) and `scrcpy` (mirroring,
//! recording).

use std::path::PathBuf;

use deck_core::SetupStatus;

/// The external tools the deck drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// `adb`, the discovery tool
    Adb,
    /// `scrcpy`, the mirror tool
    Scrcpy,
}

impl Tool {
    pub fn command_name(&self) -> &'static str {
        match self {
            Tool::Adb => "adb",
            Tool::Scrcpy => "scrcpy",
        }
    }
}

/// Configured command for each tool (bare names are looked up on PATH)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub adb: String,
    pub scrcpy: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            adb: Tool::Adb.command_name().to_string(),
            scrcpy: Tool::Scrcpy.command_name().to_string(),
        }
    }
}

impl ToolPaths {
    pub fn get(&self, tool: Tool) -> &str {
        match tool {
            Tool::Adb => &self.adb,
            Tool::Scrcpy => &self.scrcpy,
        }
    }
}

/// Resolved location of each tool (run once at startup)
#[derive(Debug, Clone, Default)]
pub struct ToolAvailability {
    /// Resolved adb executable, if found
    pub adb: Option<PathBuf>,

    /// Resolved scrcpy executable, if found
    pub scrcpy: Option<PathBuf>,
}

impl ToolAvailability {
    /// Check tool availability
    pub fn check(paths: &ToolPaths) -> Self {
        let adb = Self::candidate_adb_paths(&paths.adb)
            .into_iter()
            .find_map(|candidate| resolve(&candidate));
        let scrcpy = resolve(&paths.scrcpy);

        if adb.is_none() {
            tracing::debug!("adb not found (configured: {})", paths.adb);
        }
        if scrcpy.is_none() {
            tracing::debug!("scrcpy not found (configured: {})", paths.scrcpy);
        }

        Self { adb, scrcpy }
    }

    /// Paths to try for adb: the configured one, then the Android SDK
    /// platform-tools directories
    fn candidate_adb_paths(configured: &str) -> Vec<String> {
        let mut paths = vec![configured.to_string()];

        if configured != Tool::Adb.command_name() {
            return paths;
        }

        for var in ["ANDROID_HOME", "ANDROID_SDK_ROOT"] {
            if let Ok(sdk) = std::env::var(var) {
                paths.push(format!("{}/platform-tools/adb", sdk));
            }
        }

        paths
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        match tool {
            Tool::Adb => self.adb.is_some(),
            Tool::Scrcpy => self.scrcpy.is_some(),
        }
    }

    /// Three-way setup outcome; the discovery tool is reported first
    pub fn setup_status(&self) -> SetupStatus {
        if self.adb.is_none() {
            SetupStatus::MissingDiscoveryTool
        } else if self.scrcpy.is_none() {
            SetupStatus::MissingMirrorTool
        } else {
            SetupStatus::Ok
        }
    }

    /// Tool paths with resolved executables substituted where found
    pub fn resolved_paths(&self, configured: &ToolPaths) -> ToolPaths {
        ToolPaths {
            adb: self
                .adb
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| configured.adb.clone()),
            scrcpy: self
                .scrcpy
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| configured.scrcpy.clone()),
        }
    }
}

/// Resolve a command name or path to an executable
pub fn resolve(command: &str) -> Option<PathBuf> {
    which::which(command)
        .inspect_err(|e| tracing::trace!("which {} failed: {}", command, e))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_tool_availability_default() {
        let availability = ToolAvailability::default();
        assert!(!availability.is_available(Tool::Adb));
        assert!(!availability.is_available(Tool::Scrcpy));
        assert_eq!(
            availability.setup_status(),
            SetupStatus::MissingDiscoveryTool
        );
    }

    #[test]
    fn test_setup_status_missing_mirror() {
        let availability = ToolAvailability {
            adb: Some(PathBuf::from("/usr/bin/adb")),
            scrcpy: None,
        };
        assert_eq!(availability.setup_status(), SetupStatus::MissingMirrorTool);
    }

    #[test]
    fn test_setup_status_ok() {
        let availability = ToolAvailability {
            adb: Some(PathBuf::from("/usr/bin/adb")),
            scrcpy: Some(PathBuf::from("/usr/bin/scrcpy")),
        };
        assert_eq!(availability.setup_status(), SetupStatus::Ok);
    }

    #[test]
    fn test_check_with_missing_tools() {
        let paths = ToolPaths {
            adb: "/nonexistent/adb".to_string(),
            scrcpy: "/nonexistent/scrcpy".to_string(),
        };
        let availability = ToolAvailability::check(&paths);
        assert_eq!(
            availability.setup_status(),
            SetupStatus::MissingDiscoveryTool
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_check_resolves_existing_commands() {
        let paths = ToolPaths {
            adb: "sh".to_string(),
            scrcpy: "/nonexistent/scrcpy".to_string(),
        };
        let availability = ToolAvailability::check(&paths);
        assert!(availability.is_available(Tool::Adb));
        assert_eq!(availability.setup_status(), SetupStatus::MissingMirrorTool);

        let resolved = availability.resolved_paths(&paths);
        assert!(resolved.adb.ends_with("sh"));
        assert_eq!(resolved.scrcpy, "/nonexistent/scrcpy");
    }

    #[test]
    #[serial]
    fn test_adb_paths_include_android_home() {
        std::env::set_var("ANDROID_HOME", "/test/android");
        let paths = ToolAvailability::candidate_adb_paths("adb");
        assert!(paths
            .iter()
            .any(|p| p == "/test/android/platform-tools/adb"));
        std::env::remove_var("ANDROID_HOME");
    }

    #[test]
    #[serial]
    fn test_adb_paths_include_sdk_root() {
        std::env::set_var("ANDROID_SDK_ROOT", "/test/sdk");
        let paths = ToolAvailability::candidate_adb_paths("adb");
        assert!(paths.iter().any(|p| p.contains("/test/sdk")));
        std::env::remove_var("ANDROID_SDK_ROOT");
    }

    #[test]
    #[serial]
    fn test_explicit_adb_path_skips_sdk_fallback() {
        std::env::set_var("ANDROID_HOME", "/test/android");
        let paths = ToolAvailability::candidate_adb_paths("/opt/adb");
        assert_eq!(paths, vec!["/opt/adb".to_string()]);
        std::env::remove_var("ANDROID_HOME");
    }

    #[test]
    fn test_tool_command_names() {
        assert_eq!(Tool::Adb.command_name(), "adb");
        assert_eq!(Tool::Scrcpy.command_name(), "scrcpy");
        assert_eq!(ToolPaths::default().get(Tool::Scrcpy), "scrcpy");
    }
}

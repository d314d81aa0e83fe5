//! One-shot startup validation of the external tools

use deck_bridge::{Tool, ToolGateway};
use deck_core::SetupStatus;

/// Check that both tools are available. The discovery tool is checked
/// first, so a machine missing both reports `MissingDiscoveryTool`.
pub async fn validate_setup<G: ToolGateway + Sync>(gateway: &G) -> SetupStatus {
    if !gateway.is_tool_available(Tool::Adb).await {
        return SetupStatus::MissingDiscoveryTool;
    }
    if !gateway.is_tool_available(Tool::Scrcpy).await {
        return SetupStatus::MissingMirrorTool;
    }
    SetupStatus::Ok
}

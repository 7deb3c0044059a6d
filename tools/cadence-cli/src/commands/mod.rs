pub mod assemble;
pub mod check;
pub mod distribute;
pub mod preview;
pub mod probe;
pub mod recommend;
pub mod repair;
pub mod validate;

use std::path::Path;

use cadence_timeline_model::scene::Scene;

/// Read a JSON array of scenes.
pub fn load_timeline(path: &Path) -> anyhow::Result<Vec<Scene>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let scenes = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid timeline {}: {e}", path.display()))?;
    Ok(scenes)
}

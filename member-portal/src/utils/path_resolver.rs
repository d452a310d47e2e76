use anyhow::Result;
use std::path::PathBuf;

const APP_DIR: &str = "member-portal";

/// Resolve deployment folder (absolute path)
pub fn resolve_deployment_folder() -> Result<PathBuf> {
    // Prefer the folder where the binary is running from
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    // Fallback: current working directory
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    Ok(cwd)
}

/// Resolve the per-user data folder (token store, secret key).
///
/// `MEMBER_PORTAL_DATA_DIR` overrides the platform default.
pub fn resolve_data_folder() -> Result<PathBuf> {
    let dir = match std::env::var_os("MEMBER_PORTAL_DATA_DIR").filter(|v| !v.is_empty()) {
        Some(v) => PathBuf::from(v),
        None => match dirs::data_local_dir() {
            Some(base) => base.join(APP_DIR),
            None => resolve_deployment_folder()?.join("Portal_Data"),
        },
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data folder {:?}: {}", dir, e))?;
    Ok(dir)
}

/// Resolve log folder (absolute path)
///
/// `MEMBER_PORTAL_LOG_DIR` overrides; otherwise `<data folder>/logs`.
pub fn resolve_log_folder() -> Result<PathBuf> {
    let dir = match std::env::var_os("MEMBER_PORTAL_LOG_DIR").filter(|v| !v.is_empty()) {
        Some(v) => PathBuf::from(v),
        None => resolve_data_folder()?.join("logs"),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(dir)
}

/// Default config file location (`MEMBER_PORTAL_CONFIG` wins when set).
/// The file itself is optional.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("MEMBER_PORTAL_CONFIG").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(v));
    }
    dirs::config_dir().map(|p| p.join(APP_DIR).join("config.toml"))
}

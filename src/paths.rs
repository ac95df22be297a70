use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the detection output directory: `<exe_dir>/out/`
pub fn get_out_dir() -> PathBuf {
    get_exe_dir().join("out")
}

/// Returns the calibration directory: `<exe_dir>/config/`
pub fn get_calibration_dir() -> PathBuf {
    get_exe_dir().join("config")
}

/// Returns the reference catalog directory: `<exe_dir>/catalog/`
pub fn get_catalog_dir() -> PathBuf {
    get_exe_dir().join("catalog")
}

/// Returns the engine config file: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_out_dir())?;
    Ok(())
}

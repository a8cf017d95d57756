//! # Tool Path Resolver
//!
//! Locates the external transcoder executable.
//!
//! Search order:
//! 1. Next to the running executable (`<app_dir>/ffmpeg[.exe]`)
//! 2. Bundled tool subdirectory (`<app_dir>/ffmpeg/ffmpeg[.exe]`)
//! 3. System `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the transcoder binary and of its bundled subdirectory.
pub const FFMPEG: &str = "ffmpeg";

/// Tool path resolver for bundled and system-installed tools
pub struct ToolPathResolver {
    /// Directory holding the running executable
    app_dir: Option<PathBuf>,
    /// Whether the system `PATH` is consulted after the bundled locations
    search_system_path: bool,
}

impl Default for ToolPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolPathResolver {
    /// Create a resolver rooted at the directory of the current executable
    pub fn new() -> Self {
        let app_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        debug!("Application directory: {:?}", app_dir);

        Self {
            app_dir,
            search_system_path: true,
        }
    }

    /// Create a resolver rooted at an explicit application directory
    pub fn with_app_dir(app_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_dir: Some(app_dir.into()),
            search_system_path: true,
        }
    }

    /// Only look at the bundled locations.
    pub fn bundled_only(mut self) -> Self {
        self.search_system_path = false;
        self
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        debug!("Resolving tool: {}", tool_name);

        if let Some(ref app_dir) = self.app_dir {
            for candidate in Self::bundled_candidates(app_dir, tool_name) {
                debug!("Checking bundled path: {:?}", candidate);
                if candidate.is_file() {
                    debug!("Using bundled tool: {} -> {:?}", tool_name, candidate);
                    return Some(candidate);
                }
            }
        }

        if self.search_system_path {
            if let Some(system_path) = Self::find_in_system_path(tool_name) {
                debug!("Using system tool: {} -> {:?}", tool_name, system_path);
                return Some(system_path);
            }
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    /// Resolve the transcoder executable
    pub fn ffmpeg(&self) -> Option<PathBuf> {
        self.resolve_tool(FFMPEG)
    }

    fn bundled_candidates(app_dir: &Path, tool_name: &str) -> [PathBuf; 2] {
        let executable = Self::executable_name(tool_name);
        [
            app_dir.join(&executable),
            app_dir.join(tool_name).join(&executable),
        ]
    }

    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Find tool in system PATH
    fn find_in_system_path(tool_name: &str) -> Option<PathBuf> {
        let executable = Self::executable_name(tool_name);
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&executable))
            .find(|path| path.is_file())
    }

    /// Platform-specific hint shown when the transcoder is missing
    pub fn install_instructions() -> &'static str {
        if cfg!(target_os = "windows") {
            "Place ffmpeg.exe next to the application, in an 'ffmpeg' subfolder, or on PATH"
        } else if cfg!(target_os = "macos") {
            "brew install ffmpeg"
        } else {
            "sudo apt-get install ffmpeg  (or your distribution's equivalent)"
        }
    }
}

//! Persisted CLI settings. Only the demo-mode flag is interpreted here; any
//! other keys in the file are carried through untouched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use domain::{CoreError, DemoModeStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// Demo-mode flag stored in `settings.json`. A missing file means OFF.
#[derive(Debug, Clone)]
pub struct FileDemoModeStore {
    path: PathBuf,
}

impl FileDemoModeStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Settings, CoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(map_ioerr(&self.path, e)),
        };
        serde_json::from_str(&raw).map_err(|e| {
            CoreError::State(format!("invalid settings file {}: {e}", self.path.display()))
        })
    }

    fn save(&self, settings: &Settings) -> Result<(), CoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| map_ioerr(dir, e))?;
        }
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| CoreError::State(format!("cannot encode settings: {e}")))?;
        // Renamed into place; readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| map_ioerr(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| map_ioerr(&self.path, e))
    }
}

fn map_ioerr(path: &Path, e: io::Error) -> CoreError {
    CoreError::State(format!("{}: {e}", path.display()))
}

impl DemoModeStore for FileDemoModeStore {
    fn is_demo_mode(&self) -> Result<bool, CoreError> {
        Ok(self.load()?.demo_mode)
    }

    fn set_demo_mode(&self, enabled: bool) -> Result<(), CoreError> {
        let mut settings = self.load()?;
        settings.demo_mode = enabled;
        self.save(&settings)
    }
}

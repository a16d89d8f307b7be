use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;

/// Loads the application configuration from a YAML file.
///
/// The configuration is kept as an untyped `serde_json::Value`; components
/// extract the sections they care about through typed `from_config`
/// constructors with documented defaults, so a missing or partial file is
/// always usable.
#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("GIFTWISE_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn load_config(&self) -> Value {
        load_yaml_file(&self.config_path())
    }
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) => {
                tracing::warn!("Config file {} is not a mapping; ignoring", path.display());
                Value::Object(Map::new())
            }
            Err(err) => {
                tracing::warn!("Failed to parse {}: {}; ignoring", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(err) => {
            tracing::warn!("Failed to read {}: {}; ignoring", path.display(), err);
            Value::Object(Map::new())
        }
    }
}

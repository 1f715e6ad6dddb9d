use crate::models::{AppSettings, ExportProfile};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Extensions recognised as profile files, in lookup order.
pub const PROFILE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Profile file loaded when no names are given.
pub const DEFAULT_PROFILE_NAME: &str = "config";

/// Prefix for environment overrides of [`AppSettings`].
pub const ENV_PREFIX: &str = "PAKEXPORT";

/// Configuration manager for export profile files.
///
/// Each profile file in the configs directory holds a list of
/// [`ExportProfile`]s, written as JSON (`.json`) or YAML (`.yaml`/`.yml`).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    configs_dir: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager over the given profile directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(configs_dir: P) -> Result<Self> {
        let configs_dir = configs_dir.as_ref().to_path_buf();

        if !configs_dir.exists() {
            fs::create_dir_all(&configs_dir)
                .with_context(|| format!("Failed to create configs directory: {}", configs_dir))?;
        }

        Ok(Self { configs_dir })
    }

    /// Load process settings.
    ///
    /// Layers, lowest to highest: built-in defaults, `settings_file` (skipped
    /// when absent), `PAKEXPORT_*` environment variables.
    pub fn load_settings(settings_file: &Utf8Path) -> Result<AppSettings> {
        let settings: AppSettings = config::Config::builder()
            .add_source(config::File::from(settings_file.as_std_path()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read settings: {}", settings_file))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", settings_file))?;

        if settings.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }

        tracing::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Load every profile in one file, tagging each with its file name and index.
    pub fn load_profile_file(&self, path: &Utf8Path) -> Result<Vec<ExportProfile>> {
        let file_contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile file: {}", path))?;

        let mut profiles: Vec<ExportProfile> = match extension_of(path).as_deref() {
            Some("json") => serde_json::from_str(&file_contents)
                .with_context(|| format!("Failed to parse profile file: {}", path))?,
            Some("yaml" | "yml") => serde_yaml_ng::from_str(&file_contents)
                .with_context(|| format!("Failed to parse profile file: {}", path))?,
            _ => bail!("Unsupported profile file type: {}", path),
        };

        let file_name = path.file_name().unwrap_or(path.as_str()).to_string();
        for (index, profile) in profiles.iter_mut().enumerate() {
            profile.config_file_name = file_name.clone();
            profile.config_object_index = index;
        }

        tracing::info!("Loaded {} profile(s) from {}", profiles.len(), path);
        Ok(profiles)
    }

    /// Write profiles to `<configs_dir>/<name>.json`.
    pub fn save_profiles(&self, name: &str, profiles: &[ExportProfile]) -> Result<Utf8PathBuf> {
        let path = self.configs_dir.join(format!("{}.json", name));
        let json_string = serde_json::to_string_pretty(profiles)
            .context("Failed to serialize profiles to JSON")?;

        fs::write(&path, json_string)
            .with_context(|| format!("Failed to write profile file: {}", path))?;

        tracing::info!("Saved {} profile(s) to {}", profiles.len(), path);
        Ok(path)
    }

    /// Path of the profile file called `name`, trying each known extension.
    pub fn profile_path(&self, name: &str) -> Option<Utf8PathBuf> {
        if extension_of(Utf8Path::new(name))
            .is_some_and(|ext| PROFILE_EXTENSIONS.contains(&ext.as_str()))
        {
            let path = self.configs_dir.join(name);
            return path.is_file().then_some(path);
        }

        PROFILE_EXTENSIONS
            .iter()
            .map(|ext| self.configs_dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }

    /// Profile files in the configs directory, sorted by file name.
    pub fn list_profile_files(&self) -> Result<Vec<Utf8PathBuf>> {
        let entries = self
            .configs_dir
            .read_dir_utf8()
            .with_context(|| format!("Failed to list configs directory: {}", self.configs_dir))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to read entry in configs directory: {}", self.configs_dir)
            })?;
            let path = entry.path();
            let is_profile = extension_of(path)
                .is_some_and(|ext| PROFILE_EXTENSIONS.contains(&ext.as_str()));
            if is_profile && path.is_file() {
                files.push(path.to_path_buf());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    /// Load the named profile files.
    ///
    /// A name that is missing or fails to parse is logged and skipped; the
    /// remaining files still load.
    pub fn load_named<S: AsRef<str>>(&self, names: &[S]) -> Vec<ExportProfile> {
        let mut profiles = Vec::new();

        for name in names {
            let name = name.as_ref();
            let Some(path) = self.profile_path(name) else {
                tracing::error!(
                    "Profile file '{}' not found in {}",
                    name,
                    self.configs_dir
                );
                continue;
            };

            match self.load_profile_file(&path) {
                Ok(loaded) => profiles.extend(loaded),
                Err(e) => tracing::error!("Skipping {}: {:#}", path, e),
            }
        }

        profiles
    }

    /// Load every profile file in the configs directory.
    pub fn load_all(&self) -> Result<Vec<ExportProfile>> {
        let mut profiles = Vec::new();

        for path in self.list_profile_files()? {
            match self.load_profile_file(&path) {
                Ok(loaded) => profiles.extend(loaded),
                Err(e) => tracing::error!("Skipping {}: {:#}", path, e),
            }
        }

        Ok(profiles)
    }

    /// Load the default profile file (`config.json`, `config.yaml` or `config.yml`).
    pub fn load_default(&self) -> Vec<ExportProfile> {
        self.load_named(&[DEFAULT_PROFILE_NAME])
    }

    /// Each profile file with the game titles it contains.
    ///
    /// Files that fail to parse are listed with no titles.
    pub fn describe_profile_files(&self) -> Result<Vec<(String, Vec<String>)>> {
        let files = self.list_profile_files()?;

        Ok(files
            .iter()
            .map(|path| {
                let titles = self
                    .load_profile_file(path)
                    .map(|profiles| profiles.into_iter().map(|p| p.game_title).collect())
                    .unwrap_or_default();
                let name = path.file_name().unwrap_or(path.as_str()).to_string();
                (name, titles)
            })
            .collect())
    }

    /// Get the configs directory path.
    pub fn configs_dir(&self) -> &Utf8Path {
        &self.configs_dir
    }
}

fn extension_of(path: &Utf8Path) -> Option<String> {
    path.extension().map(|ext| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager_creates_dir() {
        let temp_dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(root.join("nested/configs")).unwrap();

        assert!(manager.configs_dir().is_dir());
    }

    #[test]
    fn test_save_and_load_profiles() {
        let (manager, _temp_dir) = create_test_config_manager();

        let mut profile = ExportProfile::new("Demo", "paks", "out");
        profile.export.push(r"Demo/.*\.ini:ini".to_string());
        let path = manager.save_profiles("demo", &[profile.clone(), profile]).unwrap();

        let loaded = manager.load_profile_file(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].config_file_name, "demo.json");
        assert_eq!(loaded[1].config_object_index, 1);
        assert_eq!(loaded[1].export, vec![r"Demo/.*\.ini:ini".to_string()]);
    }

    #[test]
    fn test_load_yaml_profile_file() {
        let (manager, _temp_dir) = create_test_config_manager();
        let path = manager.configs_dir().join("demo.yml");
        fs::write(
            &path,
            "- gameTitle: Demo\n  paksDir: paks\n  outputDir: out\n  export:\n    - 'Demo/.*:txt'\n",
        )
        .unwrap();

        let loaded = manager.load_profile_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].game_title, "Demo");
        assert_eq!(loaded[0].config_file_name, "demo.yml");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let (manager, _temp_dir) = create_test_config_manager();
        let path = manager.configs_dir().join("demo.toml");
        fs::write(&path, "").unwrap();

        assert!(manager.load_profile_file(&path).is_err());
    }

    #[test]
    fn test_profile_path_lookup() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::write(manager.configs_dir().join("demo.yaml"), "[]").unwrap();

        assert!(manager.profile_path("demo").is_some());
        assert!(manager.profile_path("demo.yaml").is_some());
        assert!(manager.profile_path("demo.json").is_none());
        assert!(manager.profile_path("missing").is_none());
    }
}

const DOCUMENTATION: &str = r#"# Dabble engine settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default value.

# canvas_size = [width, height] of new documents, in pixels.
# inference_size = long edge, in pixels, of the downsampled frame handed to the generation client.
# pencil_only = ignore touch and mouse input while drawing.
# max_texture_dimension, memory_budget (bytes) = limits of the render device.
# headless = run without a render device. Rendering becomes a no-op.
# log_level = one of "off", "error", "warn", "info", "debug", "trace".
# snapshot_compression = "fast", "default", or "best".

"#;

/// Environment variable that forces a headless session, whatever the config says.
pub const HEADLESS_ENV: &str = "DABBLE_HEADLESS";

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(
    serde::Serialize, serde::Deserialize, Copy, Clone, Debug, PartialEq, Eq, Default, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotCompression {
    Fast,
    #[default]
    Default,
    Best,
}
impl From<SnapshotCompression> for png::Compression {
    fn from(value: SnapshotCompression) -> Self {
        match value {
            SnapshotCompression::Fast => png::Compression::Fast,
            SnapshotCompression::Default => png::Compression::Default,
            SnapshotCompression::Best => png::Compression::Best,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub canvas_size: [u32; 2],
    pub inference_size: u32,
    pub pencil_only: bool,
    pub max_texture_dimension: u32,
    pub memory_budget: u64,
    pub headless: bool,
    pub log_level: String,
    pub snapshot_compression: SnapshotCompression,
    #[serde(skip)]
    pub(crate) failed_to_load: bool,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canvas_size: [1024, 1024],
            inference_size: 512,
            pencil_only: false,
            max_texture_dimension: 8192,
            memory_budget: 1 << 30,
            headless: false,
            log_level: "debug".to_owned(),
            snapshot_compression: SnapshotCompression::default(),
            failed_to_load: false,
        }
    }
}
impl EngineConfig {
    const FILENAME: &'static str = "dabble.toml";
    /// Settings from the user's preferences, or defaults if unavailable for some reason.
    #[must_use]
    pub fn from_preferences() -> Self {
        match preferences_dir() {
            None => Self::no_path(),
            Some(mut dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(&dir)
            }
        }
    }
    #[must_use]
    fn no_path() -> Self {
        log::warn!("Engine settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Self::default()
        }
    }
    #[must_use]
    pub fn load_or_default(path: &std::path::Path) -> Self {
        let config: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&string)?;
            Ok(config)
        };
        match config {
            Ok(config) => config,
            Err(e) => {
                log::debug!("failed to load {}: {e}", path.display());
                Self::no_path()
            }
        }
    }
    /// Return true if loading the user's settings failed. This can be useful for
    /// displaying a warning.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    pub fn save(&self) -> anyhow::Result<()> {
        let preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);
        self.save_to(&preferences.join(Self::FILENAME))
    }
    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let string = DOCUMENTATION.to_owned() + &toml::ser::to_string_pretty(self)?;
        std::fs::write(path, string)?;
        Ok(())
    }
    /// Config value, overridden by [`HEADLESS_ENV`] when set to anything but `0`.
    #[must_use]
    pub fn is_headless(&self) -> bool {
        self.headless || std::env::var(HEADLESS_ENV).is_ok_and(|value| value != "0")
    }
    /// Parsed log level, `Debug` if unrecognized.
    #[must_use]
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Debug)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dabble-{}-{name}", std::process::id()))
    }
    #[test]
    fn save_load_round_trip() {
        let path = temp_path("round_trip.toml");
        let config = EngineConfig {
            canvas_size: [640, 480],
            pencil_only: true,
            snapshot_compression: SnapshotCompression::Best,
            ..EngineConfig::default()
        };
        config.save_to(&path).unwrap();
        let loaded = EngineConfig::load_or_default(&path);
        let _ = std::fs::remove_file(&path);
        assert!(!loaded.did_fail_to_load());
        assert_eq!(loaded, config);
    }
    #[test]
    fn missing_keys_default() {
        let config: EngineConfig = toml::from_str("pencil_only = true\nlog_level = \"warn\"").unwrap();
        assert!(config.pencil_only);
        assert_eq!(config.canvas_size, [1024, 1024]);
        assert_eq!(config.level_filter(), log::LevelFilter::Warn);
    }
    #[test]
    fn missing_file_flags_failure() {
        let config = EngineConfig::load_or_default(&temp_path("does-not-exist.toml"));
        assert!(config.did_fail_to_load());
        assert_eq!(config.inference_size, EngineConfig::default().inference_size);
    }
}

use anyhow::Context;
use facesift_core::{Backend, FaceMatcher, OnnxFaceMatcher, PlaceholderMatcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Requested encode/compare backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// ONNX when both model files are present, otherwise the placeholder.
    Auto,
    Onnx,
    Placeholder,
}

impl std::str::FromStr for BackendChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "onnx" => Ok(BackendChoice::Onnx),
            "placeholder" => Ok(BackendChoice::Placeholder),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

/// Daemon configuration: defaults, then `FACESIFT_CONFIG` TOML, then `FACESIFT_*` env.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:5000).
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub backend: BackendChoice,
    /// Per-image download timeout.
    pub fetch_timeout_secs: u64,
    /// Timeout for fetching a folder listing page.
    pub listing_timeout_secs: u64,
    /// Most candidates taken from one folder listing.
    pub listing_limit: usize,
    /// Largest accepted `/process` request body.
    pub max_upload_bytes: usize,
    /// User agent for image downloads.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            model_dir: facesift_core::default_model_dir(),
            backend: BackendChoice::Auto,
            fetch_timeout_secs: 15,
            listing_timeout_secs: 10,
            listing_limit: 50,
            max_upload_bytes: 16 * 1024 * 1024,
            user_agent: concat!("facesift/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Config {
    /// Load the full configuration stack from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("FACESIFT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACESIFT_*` variables as seen through `lookup`.
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.bind_addr = format!("0.0.0.0:{port}"),
                Err(_) => tracing::warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        if let Some(addr) = lookup("FACESIFT_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(dir) = lookup("FACESIFT_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(agent) = lookup("FACESIFT_USER_AGENT") {
            self.user_agent = agent;
        }
        env_parse(&lookup, "FACESIFT_BACKEND", &mut self.backend);
        env_parse(&lookup, "FACESIFT_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs);
        env_parse(&lookup, "FACESIFT_LISTING_TIMEOUT_SECS", &mut self.listing_timeout_secs);
        env_parse(&lookup, "FACESIFT_LISTING_LIMIT", &mut self.listing_limit);
        env_parse(&lookup, "FACESIFT_MAX_UPLOAD_BYTES", &mut self.max_upload_bytes);
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(facesift_core::DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join(facesift_core::RECOGNIZER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Settle `auto` against the model directory.
    pub fn resolve_backend(&self) -> Backend {
        match self.backend {
            BackendChoice::Onnx => Backend::Onnx,
            BackendChoice::Placeholder => Backend::Placeholder,
            BackendChoice::Auto if facesift_core::models_present(&self.model_dir) => Backend::Onnx,
            BackendChoice::Auto => {
                tracing::warn!(
                    model_dir = %self.model_dir.display(),
                    "model files not found; falling back to placeholder matching"
                );
                Backend::Placeholder
            }
        }
    }

    /// Build the matcher for the resolved backend. Fails fast when ONNX
    /// models cannot be loaded.
    pub fn load_matcher(&self) -> anyhow::Result<Box<dyn FaceMatcher + Send>> {
        Ok(match self.resolve_backend() {
            Backend::Onnx => {
                let matcher = OnnxFaceMatcher::load(&self.detector_model_path(), &self.recognizer_model_path())
                    .context("failed to load ONNX models")?;
                tracing::info!(model_dir = %self.model_dir.display(), "ONNX face matcher loaded");
                Box::new(matcher)
            }
            Backend::Placeholder => Box::new(PlaceholderMatcher),
        })
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable override"),
        }
    }
}

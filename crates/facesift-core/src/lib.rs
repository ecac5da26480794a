//! facesift-core — Face encoding and comparison.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition, both
//! running via ONNX Runtime for CPU inference, plus a model-free placeholder
//! for environments without the model files.

pub mod alignment;
pub mod detector;
pub mod matcher;
pub mod placeholder;
pub mod recognizer;
pub mod types;

use std::path::{Path, PathBuf};

pub use detector::FaceDetector;
pub use matcher::{
    decode_image, Backend, FaceMatcher, FaceVerdict, MatchError, NoMatchReason, OnnxFaceMatcher,
    PlaceholderMatcher,
};
pub use recognizer::FaceRecognizer;
pub use types::{BoundingBox, Embedding, ReferenceEncoding};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facesift/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facesift")
        .join("models")
}

/// True when both ONNX model files are present in `model_dir`.
pub fn models_present(model_dir: &Path) -> bool {
    model_dir.join(DETECTOR_MODEL_FILE).is_file() && model_dir.join(RECOGNIZER_MODEL_FILE).is_file()
}

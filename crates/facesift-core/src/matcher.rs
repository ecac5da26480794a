//! Face matching capability: encode a reference face, compare candidate photos.
//!
//! Two backends implement [`FaceMatcher`]: [`OnnxFaceMatcher`] (SCRFD + ArcFace)
//! and [`PlaceholderMatcher`] (thumbnail signature). The backend is chosen once
//! at startup; callers only see the trait.

use crate::detector::{DetectorError, FaceDetector};
use crate::placeholder::thumbnail_signature;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::ReferenceEncoding;
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("reference encoded by {expected}, matcher produces {actual}")]
    ModelMismatch { expected: String, actual: String },
}

/// Which encode/compare implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Onnx,
    Placeholder,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Onnx => f.write_str("onnx"),
            Backend::Placeholder => f.write_str("placeholder"),
        }
    }
}

/// Why a candidate photo did not match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoMatchReason {
    /// The bytes are not a decodable image.
    Undecodable,
    /// The image decoded but holds no face.
    NoFace,
    /// Faces were found; the closest one is beyond tolerance.
    BeyondTolerance { best_distance: f32 },
}

/// Outcome of comparing one photo against the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceVerdict {
    Match { distance: f32 },
    NoMatch(NoMatchReason),
}

impl FaceVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, FaceVerdict::Match { .. })
    }
}

/// Encode/compare capability used by the scan engine.
///
/// Undecodable photos and photos without faces are verdicts, not errors.
/// Errors are reserved for failures of the capability itself.
pub trait FaceMatcher {
    fn backend(&self) -> Backend;

    /// Encode the most prominent face in `image`; `None` when there is none.
    fn encode_reference(&mut self, image: &[u8]) -> Result<Option<ReferenceEncoding>, MatchError>;

    /// Compare every face in `image` against `reference`. The first face
    /// within `tolerance` wins.
    fn compare(
        &mut self,
        image: &[u8],
        reference: &ReferenceEncoding,
        tolerance: f32,
    ) -> Result<FaceVerdict, MatchError>;
}

/// Decode raw bytes into an image, or `None` if the format is not understood.
pub fn decode_image(bytes: &[u8]) -> Option<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(img),
        Err(e) => {
            tracing::debug!(error = %e, len = bytes.len(), "could not decode image");
            None
        }
    }
}

fn check_model(reference: &ReferenceEncoding, actual: &str) -> Result<(), MatchError> {
    match reference.model_version() {
        Some(expected) if expected != actual => Err(MatchError::ModelMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

/// SCRFD detection + ArcFace recognition.
pub struct OnnxFaceMatcher {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceMatcher {
    pub fn load(detector_path: &str, recognizer_path: &str) -> Result<Self, MatchError> {
        let detector = FaceDetector::load(detector_path)?;
        tracing::info!(path = detector_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(recognizer_path)?;
        tracing::info!(path = recognizer_path, "ArcFace recognizer loaded");

        Ok(Self { detector, recognizer })
    }

    fn decode_rgb(bytes: &[u8]) -> Option<RgbImage> {
        decode_image(bytes).map(|img| img.to_rgb8())
    }
}

impl FaceMatcher for OnnxFaceMatcher {
    fn backend(&self) -> Backend {
        Backend::Onnx
    }

    fn encode_reference(&mut self, image: &[u8]) -> Result<Option<ReferenceEncoding>, MatchError> {
        let Some(rgb) = Self::decode_rgb(image) else {
            return Ok(None);
        };

        // Detector output is sorted by confidence.
        let faces = self.detector.detect(&rgb)?;
        let Some(face) = faces.first() else {
            tracing::warn!("no face found in reference image");
            return Ok(None);
        };

        let embedding = self.recognizer.extract(&rgb, face)?;
        tracing::info!(confidence = face.confidence, faces = faces.len(), "reference face encoded");
        Ok(Some(ReferenceEncoding::new(embedding)))
    }

    fn compare(
        &mut self,
        image: &[u8],
        reference: &ReferenceEncoding,
        tolerance: f32,
    ) -> Result<FaceVerdict, MatchError> {
        check_model(reference, crate::recognizer::ARCFACE_MODEL_VERSION)?;

        let Some(rgb) = Self::decode_rgb(image) else {
            return Ok(FaceVerdict::NoMatch(NoMatchReason::Undecodable));
        };

        let faces = self.detector.detect(&rgb)?;
        if faces.is_empty() {
            return Ok(FaceVerdict::NoMatch(NoMatchReason::NoFace));
        }

        let mut best_distance = f32::INFINITY;
        for face in &faces {
            let embedding = self.recognizer.extract(&rgb, face)?;
            let distance = reference.embedding().distance(&embedding);
            if distance <= tolerance {
                return Ok(FaceVerdict::Match { distance });
            }
            best_distance = best_distance.min(distance);
        }

        Ok(FaceVerdict::NoMatch(NoMatchReason::BeyondTolerance { best_distance }))
    }
}

/// Thumbnail-signature matcher; needs no model files.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderMatcher;

impl FaceMatcher for PlaceholderMatcher {
    fn backend(&self) -> Backend {
        Backend::Placeholder
    }

    fn encode_reference(&mut self, image: &[u8]) -> Result<Option<ReferenceEncoding>, MatchError> {
        let signature = decode_image(image).and_then(|img| thumbnail_signature(&img));
        if signature.is_none() {
            tracing::warn!("no signature for reference image");
        }
        Ok(signature.map(ReferenceEncoding::new))
    }

    fn compare(
        &mut self,
        image: &[u8],
        reference: &ReferenceEncoding,
        tolerance: f32,
    ) -> Result<FaceVerdict, MatchError> {
        check_model(reference, crate::placeholder::THUMBNAIL_MODEL_VERSION)?;

        let Some(img) = decode_image(image) else {
            return Ok(FaceVerdict::NoMatch(NoMatchReason::Undecodable));
        };
        let Some(signature) = thumbnail_signature(&img) else {
            return Ok(FaceVerdict::NoMatch(NoMatchReason::NoFace));
        };

        let distance = reference.embedding().distance(&signature);
        Ok(if distance <= tolerance {
            FaceVerdict::Match { distance }
        } else {
            FaceVerdict::NoMatch(NoMatchReason::BeyondTolerance { best_distance: distance })
        })
    }
}

//! Model weight resolution

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::InferenceError;

/// Materializes a weight file at a local path (download, copy, or nothing)
pub trait WeightFetcher: Send + Sync {
    fn ensure_local(&self, path: &Path) -> Result<(), String>;
}

/// Fetcher for weights that are provisioned ahead of time; it only checks presence
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalWeights;

impl WeightFetcher for LocalWeights {
    fn ensure_local(&self, path: &Path) -> Result<(), String> {
        if path.is_file() {
            Ok(())
        } else {
            Err("file not found and no remote source configured".to_string())
        }
    }
}

/// Run the fetcher once, then require the file to exist. No retries.
pub fn ensure_weights(fetcher: &dyn WeightFetcher, path: &Path) -> Result<PathBuf, InferenceError> {
    debug!("Ensuring model weights at {}", path.display());

    if let Err(reason) = fetcher.ensure_local(path) {
        warn!("Weight fetch failed for {}: {}", path.display(), reason);
        return Err(InferenceError::WeightUnavailable {
            path: path.to_path_buf(),
            reason,
        });
    }

    if !path.is_file() {
        return Err(InferenceError::WeightUnavailable {
            path: path.to_path_buf(),
            reason: "fetcher reported success but the file is missing".to_string(),
        });
    }

    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lying;

    impl WeightFetcher for Lying {
        fn ensure_local(&self, _path: &Path) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn test_missing_local_weights() {
        let path = std::env::temp_dir().join("scene-detect-missing-weights.onnx");
        let err = ensure_weights(&LocalWeights, &path).unwrap_err();
        assert!(matches!(err, InferenceError::WeightUnavailable { .. }));
    }

    #[test]
    fn test_fetcher_success_still_requires_file() {
        let path = std::env::temp_dir().join("scene-detect-never-written.onnx");
        let err = ensure_weights(&Lying, &path).unwrap_err();
        match err {
            InferenceError::WeightUnavailable { reason, .. } => assert!(reason.contains("missing")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_present_weights() {
        let path = std::env::temp_dir().join(format!("scene-detect-weights-{}.onnx", std::process::id()));
        std::fs::write(&path, b"onnx").unwrap();
        assert_eq!(ensure_weights(&LocalWeights, &path).unwrap(), path);
        std::fs::remove_file(&path).unwrap();
    }
}

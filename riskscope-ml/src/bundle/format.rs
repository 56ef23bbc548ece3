//! On-disk model bundle.
//!
//! Layout: magic `RSKB`, format version (`u16`, little endian), SHA-256 of the
//! payload (32 bytes), then the bincode-encoded [`ModelBundle`].

use crate::calibration::CalibrationMode;
use crate::data::TargetEncoding;
use crate::error::{MlError, Result};
use crate::model::Model;
use chrono::{DateTime, Utc};
use riskscope_core::persistence::atomic_write;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

pub const MAGIC: &[u8; 4] = b"RSKB";
pub const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 32;

/// Ordered feature names a bundle expects at inference time.
///
/// Non-empty, unique and without blank names; checked again on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSpec(Vec<String>);

impl FeatureSpec {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(MlError::config("Feature list is empty"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(MlError::config("Feature names must not be blank"));
            }
            if !seen.insert(name.as_str()) {
                return Err(MlError::config(format!("Duplicate feature name '{name}'")));
            }
        }
        Ok(Self(names))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<String>> for FeatureSpec {
    type Error = MlError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureSpec> for Vec<String> {
    fn from(spec: FeatureSpec) -> Self {
        spec.0
    }
}

/// A fitted model plus everything inference needs to reproduce its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model: Model,
    /// `None` only for bundles written without a feature list.
    pub features: Option<FeatureSpec>,
    pub target: String,
    pub target_encoding: TargetEncoding,
    pub calibration: CalibrationMode,
}

impl ModelBundle {
    pub fn new(
        model: Model,
        features: Option<FeatureSpec>,
        target: impl Into<String>,
        target_encoding: TargetEncoding,
    ) -> Self {
        let calibration = model.calibration();
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model,
            features,
            target: target.into(),
            target_encoding,
            calibration,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        let digest = Sha256::digest(&payload);
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&digest);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(MlError::bundle("File is too short to be a model bundle"));
        }
        let (magic, rest) = bytes.split_at(4);
        if magic != MAGIC {
            return Err(MlError::bundle("Not a model bundle (bad magic)"));
        }
        let version = u16::from_le_bytes([rest[0], rest[1]]);
        if version != FORMAT_VERSION {
            return Err(MlError::bundle(format!(
                "Unsupported bundle version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let (digest, payload) = rest[2..].split_at(32);
        if Sha256::digest(payload).as_slice() != digest {
            return Err(MlError::bundle("Checksum mismatch, bundle is corrupt"));
        }
        bincode::deserialize(payload)
            .map_err(|e| MlError::bundle(format!("Cannot decode bundle: {e}")))
    }

    /// Atomically write the bundle to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, &self.to_bytes()?)?;
        tracing::info!(
            path = %path.display(),
            bundle_id = %self.id,
            algorithm = %self.model.kind(),
            "Saved model bundle"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::testing::blobs;
    use crate::algorithms::{AlgorithmKind, Classifier};
    use tempfile::TempDir;

    fn bundle() -> ModelBundle {
        let (x, y) = blobs(40, 3);
        let mut model = Model::new(AlgorithmKind::LogisticRegression, CalibrationMode::None, 5, 3)
            .unwrap();
        model.fit(&x, &y).unwrap();
        let spec = FeatureSpec::new(vec!["a".into(), "b".into()]).unwrap();
        ModelBundle::new(model, Some(spec), "label", TargetEncoding::AsIs)
    }

    #[test]
    fn test_feature_spec_validation() {
        assert!(FeatureSpec::new(vec![]).is_err());
        assert!(FeatureSpec::new(vec!["a".into(), " ".into()]).is_err());
        assert!(FeatureSpec::new(vec!["a".into(), "a".into()]).is_err());
        assert_eq!(FeatureSpec::new(vec!["b".into(), "a".into()]).unwrap().names(), ["b", "a"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("lr.bundle");
        let original = bundle();
        original.save(&path).unwrap();
        let loaded = ModelBundle::load(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut bytes = bundle().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let err = ModelBundle::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), "bundle_error");
        assert!(err.to_string().contains("Checksum"));
    }

    #[test]
    fn test_wrong_magic_and_version() {
        let bytes = bundle().to_bytes().unwrap();
        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(ModelBundle::from_bytes(&bad_magic).unwrap_err().to_string().contains("magic"));

        let mut bad_version = bytes;
        bad_version[4] = 9;
        assert!(ModelBundle::from_bytes(&bad_version).unwrap_err().to_string().contains("version"));
        assert_eq!(ModelBundle::from_bytes(b"RS").unwrap_err().kind(), "bundle_error");
    }

    #[test]
    fn test_invalid_feature_spec_rejected_on_load() {
        // Re-encode with a duplicated feature list behind a valid checksum.
        #[derive(Serialize)]
        struct Raw<'a> {
            id: Uuid,
            created_at: DateTime<Utc>,
            model: &'a Model,
            features: Option<Vec<String>>,
            target: &'a str,
            target_encoding: TargetEncoding,
            calibration: CalibrationMode,
        }
        let good = bundle();
        let raw = Raw {
            id: good.id,
            created_at: good.created_at,
            model: &good.model,
            features: Some(vec!["a".into(), "a".into()]),
            target: &good.target,
            target_encoding: good.target_encoding.clone(),
            calibration: good.calibration,
        };
        let payload = bincode::serialize(&raw).unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&Sha256::digest(&payload));
        bytes.extend_from_slice(&payload);
        let err = ModelBundle::from_bytes(&bytes).unwrap_err();
        assert_eq!(err.kind(), "bundle_error");
    }
}

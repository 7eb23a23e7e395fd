use std::path::PathBuf;

/// Post-processing encryption configuration. The three variants are
/// mutually exclusive at the configuration layer; this type only ever
/// represents the single mode that was selected.
#[derive(Debug, Clone)]
pub enum EncryptionMode {
  None,
  GpgSymmetric { passphrase: String },
  GpgAsymmetric { public_key_ring_file: PathBuf },
  AgeSymmetric { passphrase: String },
  AgeAsymmetric { recipients: Vec<String> },
}

impl EncryptionMode {
  pub fn extension(&self) -> Option<&'static str> {
    match self {
      EncryptionMode::None => None,
      EncryptionMode::GpgSymmetric { .. } | EncryptionMode::GpgAsymmetric { .. } => {
        Some("gpg")
      }
      EncryptionMode::AgeSymmetric { .. } | EncryptionMode::AgeAsymmetric { .. } => {
        Some("age")
      }
    }
  }
}

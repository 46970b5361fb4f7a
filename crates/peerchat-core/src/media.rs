//! Validation of captured media before anything is staged
//!
//! Files must fit under the size cap and carry an accepted MIME prefix;
//! recordings must not be empty. A rejected payload never reaches the codec.

use crate::config::MediaConfig;
use crate::errors::MediaError;

const MIB: usize = 1024 * 1024;
const KIB: usize = 1024;

#[derive(Debug, Clone)]
pub struct MediaValidator {
    config: MediaConfig,
}

impl MediaValidator {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Size is checked before type
    pub fn validate_file(&self, file_type: &str, size: usize) -> Result<(), MediaError> {
        if size > self.config.max_file_bytes {
            return Err(MediaError::TooLarge {
                size,
                max: self.config.max_file_bytes,
                max_label: size_label(self.config.max_file_bytes),
            });
        }

        let mime = file_type.trim().to_ascii_lowercase();
        let accepted = self
            .config
            .allowed_type_prefixes
            .iter()
            .any(|prefix| mime.starts_with(&prefix.to_ascii_lowercase()));
        if !accepted {
            return Err(MediaError::UnsupportedType {
                mime: file_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_audio(&self, size: usize) -> Result<(), MediaError> {
        if size == 0 {
            return Err(MediaError::EmptyRecording);
        }
        Ok(())
    }
}

fn size_label(bytes: usize) -> String {
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}

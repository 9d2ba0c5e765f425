//! Runtime SPIR-V loading.
//!
//! Shaders are compiled to `.spv` offline and loaded from disk at startup, so
//! the build needs no shader toolchain.

use crate::error::{GpuError, Result};
use std::path::Path;

/// SPIR-V magic number, first word of every valid module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Load a SPIR-V module from disk into host-endian words.
///
/// Validates the word alignment and magic number before handing the words to
/// the driver; anything else is the driver's problem.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;

    if bytes.len() % 4 != 0 {
        return Err(GpuError::ShaderLoad(format!(
            "{}: length {} is not a multiple of 4",
            path.display(),
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(GpuError::ShaderLoad(format!(
            "{}: missing SPIR-V magic number",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn loads_a_minimal_valid_module() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0] {
            bytes.extend_from_slice(&u32::to_le_bytes(word));
        }
        let path = write_temp("ember_shader_ok.spv", &bytes);

        let words = load_spirv(&path).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words.len(), 5);
    }

    #[test]
    fn rejects_misaligned_length() {
        let path = write_temp("ember_shader_misaligned.spv", &[1, 2, 3]);
        let err = load_spirv(&path).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad(_)));
    }

    #[test]
    fn rejects_wrong_magic() {
        let path = write_temp("ember_shader_magic.spv", &[0xFF; 8]);
        let err = load_spirv(&path).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad(_)));
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = load_spirv(Path::new("/nonexistent/ember.spv")).unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad(_)));
    }
}

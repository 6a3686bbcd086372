//! Content fingerprinting
//!
//! A task's input fingerprint is a SHA-256 over its resolved command
//! string and the contents of every declared input file, expanded from
//! globs and visited in sorted path order. Output fingerprints summarize
//! the declared output files, or the captured stdout when a task
//! declares none.

use crate::error::{CacheError, CacheResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Hash arbitrary bytes to a hex digest
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a string to a hex digest
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Stream a file's content into the hasher
fn hash_file_into(hasher: &mut Sha256, path: &Path) -> CacheResult<()> {
    let file = File::open(path).map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        error: e,
    })?;

    let mut reader = BufReader::with_capacity(8192, file);
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}

/// Expand input globs relative to a base directory
///
/// Returns matching files in sorted order, deduplicated. A pattern with
/// no matches contributes nothing; only a malformed pattern is an error.
pub fn expand_inputs(patterns: &[String], base: &Path) -> CacheResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full = base.join(pattern);
        let full_str = full.to_str().ok_or_else(|| CacheError::Pattern {
            pattern: pattern.clone(),
            error: "pattern is not valid UTF-8".to_string(),
        })?;

        let paths = glob::glob(full_str).map_err(|e| CacheError::Pattern {
            pattern: pattern.clone(),
            error: e.to_string(),
        })?;

        for entry in paths {
            let path = entry.map_err(|e| CacheError::Io {
                path: PathBuf::from(pattern),
                error: e.into_error(),
            })?;
            if path.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Compute the input fingerprint for a task
pub fn input_fingerprint(
    command: &str,
    input_patterns: &[String],
    base: &Path,
) -> CacheResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());

    for path in expand_inputs(input_patterns, base)? {
        let label = path.strip_prefix(base).unwrap_or(&path);
        hasher.update(label.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hash_file_into(&mut hasher, &path)?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the output fingerprint for a completed task
///
/// Declared outputs must all exist; a missing one is an error the
/// caller downgrades. With no declared outputs the captured stdout is
/// the output.
pub fn output_fingerprint(
    outputs: &[PathBuf],
    base: &Path,
    stdout: &str,
) -> CacheResult<String> {
    if outputs.is_empty() {
        return Ok(hash_str(stdout));
    }

    let mut hasher = Sha256::new();
    for output in outputs {
        let path = if output.is_absolute() {
            output.clone()
        } else {
            base.join(output)
        };
        hasher.update(output.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hash_file_into(&mut hasher, &path)?;
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hash_str_stable() {
        assert_eq!(hash_str("abc"), hash_str("abc"));
        assert_ne!(hash_str("abc"), hash_str("abd"));
    }

    #[test]
    fn test_expand_inputs_sorted_and_deduplicated() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();

        let patterns = vec!["*.txt".to_string(), "a.txt".to_string()];
        let files = expand_inputs(&patterns, temp.path()).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.txt"));
        assert!(files[1].ends_with("b.txt"));
    }

    #[test]
    fn test_expand_inputs_no_match_is_empty() {
        let temp = TempDir::new().unwrap();
        let files = expand_inputs(&["*.nope".to_string()], temp.path()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_input_fingerprint_changes_with_command() {
        let temp = TempDir::new().unwrap();
        let a = input_fingerprint("echo 1", &[], temp.path()).unwrap();
        let b = input_fingerprint("echo 2", &[], temp.path()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_input_fingerprint_changes_with_file_content() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("data.txt");
        let patterns = vec!["data.txt".to_string()];

        fs::write(&input, "v1").unwrap();
        let before = input_fingerprint("cmd", &patterns, temp.path()).unwrap();

        fs::write(&input, "v2").unwrap();
        let after = input_fingerprint("cmd", &patterns, temp.path()).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_input_fingerprint_stable_for_same_inputs() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("data.txt"), "same").unwrap();
        let patterns = vec!["*.txt".to_string()];

        let one = input_fingerprint("cmd", &patterns, temp.path()).unwrap();
        let two = input_fingerprint("cmd", &patterns, temp.path()).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn test_output_fingerprint_from_stdout() {
        let temp = TempDir::new().unwrap();
        let fp = output_fingerprint(&[], temp.path(), "captured").unwrap();
        assert_eq!(fp, hash_str("captured"));
    }

    #[test]
    fn test_output_fingerprint_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let outputs = vec![PathBuf::from("missing.txt")];
        let result = output_fingerprint(&outputs, temp.path(), "");
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_output_fingerprint_from_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("out.txt"), "artifact").unwrap();
        let outputs = vec![PathBuf::from("out.txt")];

        let one = output_fingerprint(&outputs, temp.path(), "").unwrap();
        fs::write(temp.path().join("out.txt"), "changed").unwrap();
        let two = output_fingerprint(&outputs, temp.path(), "").unwrap();

        assert_ne!(one, two);
    }
}

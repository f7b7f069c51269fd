//! SafeTensors header reader.
//!
//! A SafeTensors file starts with a little-endian `u64` header length followed
//! by that many bytes of JSON. The optional `__metadata__` object carries the
//! training metadata archived alongside the catalog data.

use crate::error::{ArchiveError, Result};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;

/// Upper bound on the JSON header size.
const MAX_HEADER_LEN: u64 = 100 * 1024 * 1024;

const METADATA_KEY: &str = "__metadata__";

/// Read the `__metadata__` object from a SafeTensors header.
///
/// Returns an empty object when the header has no metadata section.
pub fn read_header_metadata(path: impl AsRef<Path>) -> Result<Map<String, Value>> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| ArchiveError::io_with_path(e, path))?;

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)
        .map_err(|e| malformed(path, format!("missing header length: {}", e)))?;
    let header_len = u64::from_le_bytes(len_bytes);
    if header_len > MAX_HEADER_LEN {
        return Err(malformed(
            path,
            format!("header length {} exceeds limit", header_len),
        ));
    }

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .map_err(|e| malformed(path, format!("truncated header: {}", e)))?;

    let parsed: Value = serde_json::from_slice(&header)
        .map_err(|e| malformed(path, format!("invalid header JSON: {}", e)))?;

    match parsed {
        Value::Object(mut root) => match root.remove(METADATA_KEY) {
            Some(Value::Object(metadata)) => Ok(metadata),
            Some(other) => Err(malformed(
                path,
                format!("__metadata__ is not an object: {}", other),
            )),
            None => Ok(Map::new()),
        },
        _ => Err(malformed(path, "header is not a JSON object".to_string())),
    }
}

fn malformed(path: &Path, message: String) -> ArchiveError {
    ArchiveError::MalformedHeader {
        path: path.to_path_buf(),
        message,
    }
}

#[cfg(test)]
pub(crate) fn encode_test_file(header: &Value, body: &[u8]) -> Vec<u8> {
    let header = serde_json::to_vec(header).unwrap();
    let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(body);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_reads_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.safetensors");
        let header = json!({
            "__metadata__": {"ss_network_dim": "32", "modelspec.title": "Test"},
            "w": {"dtype": "F16", "shape": [1], "data_offsets": [0, 2]}
        });
        std::fs::write(&path, encode_test_file(&header, &[0, 0])).unwrap();

        let metadata = read_header_metadata(&path).unwrap();
        assert_eq!(metadata["ss_network_dim"], "32");
        assert_eq!(metadata.len(), 2);
    }

    #[test]
    fn test_header_without_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.safetensors");
        std::fs::write(&path, encode_test_file(&json!({}), b"")).unwrap();

        assert!(read_header_metadata(&path).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.safetensors");
        let mut bytes = 64u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{\"a\"");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_header_metadata(&path),
            Err(ArchiveError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_absurd_header_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.safetensors");
        std::fs::write(&path, u64::MAX.to_le_bytes()).unwrap();

        assert!(matches!(
            read_header_metadata(&path),
            Err(ArchiveError::MalformedHeader { .. })
        ));
    }
}

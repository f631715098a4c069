//! BLAKE3 hashing for templates, rendered resources, and construct paths.

use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a JSON value. `serde_json::Value` objects are key-sorted, so equal
/// values hash equal regardless of insertion order.
pub fn hash_json(value: &serde_json::Value) -> String {
    hash_string(&value.to_string())
}

/// First 8 hex digits (upper-case) of the hash of a construct path.
pub fn path_hash(components: &[&str]) -> String {
    let joined = components.join("/");
    let hex = blake3::hash(joined.as_bytes()).to_hex();
    hex[..8].to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, "{}").unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("{}"));
    }

    #[test]
    fn test_hash_file_not_found() {
        let result = hash_file(Path::new("/nonexistent/template.json"));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_hash_string() {
        assert_eq!(hash_string("hello"), hash_string("hello"));
        assert_ne!(hash_string("hello"), hash_string("world"));
    }

    #[test]
    fn test_hash_json_key_order_independent() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(hash_json(&a), hash_json(&b));
    }

    #[test]
    fn test_path_hash_shape() {
        let h = path_hash(&["CfAlbAsgStack", "vpc"]);
        assert_eq!(h.len(), 8);
        assert!(h.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(h, path_hash(&["CfAlbAsgStack", "vpc"]));
        assert_ne!(h, path_hash(&["CfAlbAsgStack", "alb"]));
    }
}

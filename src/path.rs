//! Logical path resolution.
//!
//! A logical path is `<bucket>[/<key segment>]*`: the first segment names the
//! bucket, the remaining segments joined with `/` form the object key.

use crate::error::TransferError;

/// A resolved logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPath {
    pub bucket: String,
    pub key: String,
}

impl ObjectPath {
    /// Split a logical path into bucket and key.
    ///
    /// Surrounding slashes are ignored. A path without a bucket segment is
    /// rejected; the key is empty when only a bucket is given. Pure and
    /// deterministic, no side effects.
    pub fn parse(path: &str) -> Result<Self, TransferError> {
        let mut segments = path.trim_matches('/').split('/');
        let bucket = match segments.next() {
            Some(first) if !first.is_empty() => first.to_string(),
            _ => return Err(TransferError::InvalidPath(path.to_string())),
        };
        let key = segments.collect::<Vec<_>>().join("/");
        Ok(Self { bucket, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_only() {
        let p = ObjectPath::parse("mybucket").unwrap();
        assert_eq!(p.bucket, "mybucket");
        assert_eq!(p.key, "");
    }

    #[test]
    fn bucket_and_key() {
        let p = ObjectPath::parse("mybucket/a/b/c.txt").unwrap();
        assert_eq!(p.bucket, "mybucket");
        assert_eq!(p.key, "a/b/c.txt");
    }

    #[test]
    fn surrounding_slashes_are_ignored() {
        let p = ObjectPath::parse("/mybucket/dir/file").unwrap();
        assert_eq!(p.bucket, "mybucket");
        assert_eq!(p.key, "dir/file");

        let p = ObjectPath::parse("mybucket/dir/").unwrap();
        assert_eq!(p.key, "dir");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(matches!(
            ObjectPath::parse(""),
            Err(TransferError::InvalidPath(_))
        ));
        assert!(matches!(
            ObjectPath::parse("/"),
            Err(TransferError::InvalidPath(_))
        ));
        assert!(matches!(
            ObjectPath::parse("///"),
            Err(TransferError::InvalidPath(_))
        ));
    }

    #[test]
    fn identical_input_yields_identical_result() {
        assert_eq!(
            ObjectPath::parse("b/k1/k2").unwrap(),
            ObjectPath::parse("b/k1/k2").unwrap()
        );
    }
}

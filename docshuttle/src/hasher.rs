use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
}

#[derive(Debug, Clone, Copy)]
pub enum HashInput<'a> {
    Bytes(&'a [u8]),
    Text(&'a str),
}

impl<'a> From<&'a [u8]> for HashInput<'a> {
    fn from(value: &'a [u8]) -> Self {
        HashInput::Bytes(value)
    }
}

impl<'a> From<&'a str> for HashInput<'a> {
    fn from(value: &'a str) -> Self {
        HashInput::Text(value)
    }
}

/// Lowercase hex digest of `input`. Used for integrity checks, not security.
pub fn digest<'a>(algorithm: HashAlgorithm, input: impl Into<HashInput<'a>>) -> String {
    let bytes = match input.into() {
        HashInput::Bytes(bytes) => bytes,
        HashInput::Text(text) => text.as_bytes(),
    };
    match algorithm {
        HashAlgorithm::Md5 => format!("{:x}", md5::compute(bytes)),
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    digest(HashAlgorithm::Md5, bytes)
}

/// Key under which CSV metadata for a local file is stored.
pub fn path_digest(path: &Path) -> String {
    digest(HashAlgorithm::Md5, path.to_string_lossy().as_ref())
}

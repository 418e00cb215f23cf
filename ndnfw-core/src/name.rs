use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::tlv::{TlvElement, TlvError};
use crate::packets::tlv_types;

/// Hierarchical NDN name: an ordered sequence of opaque byte components.
///
/// Ordering and equality are component-wise, so `/a` sorts before `/a/b`
/// and names of different lengths never compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Vec<u8>>,
}

impl Name {
    /// Create a new empty name
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn from_components<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Self {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a URI such as `/hello/world`, decoding `%XX` escapes.
    ///
    /// Empty components (`//`, trailing `/`) are skipped, so `/a/` and `/a`
    /// name the same thing.
    pub fn from_uri(uri: &str) -> Result<Self, NameError> {
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        if !path.starts_with('/') {
            return Err(NameError::MissingLeadingSlash(uri.to_string()));
        }

        let mut components = Vec::new();
        for part in path.split('/').filter(|part| !part.is_empty()) {
            components.push(percent_decode(part)?);
        }
        Ok(Self { components })
    }

    pub fn push(&mut self, component: impl Into<Vec<u8>>) -> &mut Self {
        self.components.push(component.into());
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.components.get(index).map(Vec::as_slice)
    }

    pub fn components(&self) -> impl Iterator<Item = &[u8]> {
        self.components.iter().map(Vec::as_slice)
    }

    /// Check if this name is a prefix of another name
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len()
            && self.components.iter().zip(other.components.iter()).all(|(a, b)| a == b)
    }

    /// Prefix with at most `length` components.
    pub fn get_prefix(&self, length: usize) -> Name {
        Name {
            components: self.components.iter().take(length).cloned().collect(),
        }
    }

    /// Hash of the first `length` components.
    ///
    /// The filter keys rules by this value, so a registered prefix and the
    /// same-length prefix of an incoming name hash identically without
    /// building an intermediate `Name`.
    pub fn prefix_hash(&self, length: usize) -> u64 {
        let end = length.min(self.components.len());
        let mut hasher = DefaultHasher::new();
        end.hash(&mut hasher);
        for component in &self.components[..end] {
            component.hash(&mut hasher);
        }
        hasher.finish()
    }

    pub fn to_uri(&self) -> String {
        if self.is_empty() {
            return "/".to_string();
        }
        let mut uri = String::new();
        for component in &self.components {
            uri.push('/');
            percent_encode_into(component, &mut uri);
        }
        uri
    }

    /// Encode name to TLV format
    pub fn encode(&self) -> Result<Vec<u8>, TlvError> {
        self.to_element()?.encode()
    }

    pub(crate) fn to_element(&self) -> Result<TlvElement, TlvError> {
        let mut components_tlv = Vec::new();
        for component in &self.components {
            TlvElement::new(tlv_types::GENERIC_NAME_COMPONENT, component.clone())
                .encode_to(&mut components_tlv)?;
        }
        Ok(TlvElement::new(tlv_types::NAME, components_tlv))
    }

    /// Decode name from TLV format
    pub fn decode(data: &[u8]) -> Result<(Self, usize), TlvError> {
        let (element, consumed) = TlvElement::decode(data)?;
        Ok((Self::from_element(&element)?, consumed))
    }

    pub(crate) fn from_element(element: &TlvElement) -> Result<Self, TlvError> {
        if element.type_ != tlv_types::NAME {
            return Err(TlvError::InvalidType(element.type_));
        }

        let mut name = Name::new();
        let mut offset = 0;
        while offset < element.value.len() {
            let (component, consumed) = TlvElement::decode(&element.value[offset..])?;
            if !matches!(
                component.type_,
                tlv_types::GENERIC_NAME_COMPONENT
                    | tlv_types::IMPLICIT_SHA256_DIGEST_COMPONENT
                    | tlv_types::PARAMETERS_SHA256_DIGEST_COMPONENT
            ) {
                return Err(TlvError::InvalidType(component.type_));
            }
            name.components.push(component.value);
            offset += consumed;
        }
        Ok(name)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::from_uri(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name '{0}' must start with '/'")]
    MissingLeadingSlash(String),
    #[error("invalid percent-escape in component '{0}'")]
    InvalidEscape(String),
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn percent_encode_into(component: &[u8], out: &mut String) {
    for &byte in component {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
}

fn percent_decode(part: &str) -> Result<Vec<u8>, NameError> {
    let bytes = part.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| NameError::InvalidEscape(part.to_string()))?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_creation() {
        let name = Name::from_uri("/hello/world/test").unwrap();
        assert_eq!(name.len(), 3);
        assert_eq!(name.get(0), Some(&b"hello"[..]));
        assert_eq!(name.get(2), Some(&b"test"[..]));
    }

    #[test]
    fn test_empty_components_are_skipped() {
        let name = Name::from_uri("/a//b/").unwrap();
        assert_eq!(name.to_uri(), "/a/b");
        assert_eq!(Name::from_uri("/").unwrap(), Name::new());
        assert_eq!(Name::new().to_uri(), "/");
    }

    #[test]
    fn test_scheme_and_missing_slash() {
        assert_eq!(Name::from_uri("ndn:/a").unwrap().to_uri(), "/a");
        assert!(matches!(Name::from_uri("a/b"), Err(NameError::MissingLeadingSlash(_))));
    }

    #[test]
    fn test_percent_encoding() {
        let name = Name::from_components([vec![0x00, b'a'], b"b c".to_vec()]);
        assert_eq!(name.to_uri(), "/%00a/b%20c");
        assert_eq!(Name::from_uri("/%00a/b%20c").unwrap(), name);
        assert!(matches!(Name::from_uri("/bad%2"), Err(NameError::InvalidEscape(_))));
    }

    #[test]
    fn test_prefix_relationships() {
        let short = Name::from_uri("/a/b").unwrap();
        let long = Name::from_uri("/a/b/c").unwrap();
        assert!(short.is_prefix_of(&long));
        assert!(!long.is_prefix_of(&short));
        assert!(Name::new().is_prefix_of(&short));
        assert_eq!(long.get_prefix(2), short);
        assert!(short < long);
    }

    #[test]
    fn test_prefix_hash_matches_registered_prefix() {
        let rule = Name::from_uri("/a/b").unwrap();
        let incoming = Name::from_uri("/a/b/c").unwrap();
        assert_eq!(rule.prefix_hash(rule.len()), incoming.prefix_hash(2));
        assert_ne!(incoming.prefix_hash(2), incoming.prefix_hash(3));
    }

    #[test]
    fn test_component_boundaries_affect_hash() {
        let joined = Name::from_uri("/ab").unwrap();
        let split = Name::from_uri("/a/b").unwrap();
        assert_ne!(joined.prefix_hash(1), split.prefix_hash(2));
    }

    #[test]
    fn test_tlv_encoding() {
        let name = Name::from_uri("/hi/x").unwrap();
        let encoded = name.encode().unwrap();
        assert_eq!(encoded, vec![0x07, 7, 0x08, 2, b'h', b'i', 0x08, 1, b'x']);

        let (decoded, consumed) = Name::decode(&encoded).unwrap();
        assert_eq!(decoded, name);
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_decode_rejects_unknown_component_type() {
        let bogus = [0x07, 3, 0x30, 1, b'x'];
        assert!(matches!(Name::decode(&bogus), Err(TlvError::InvalidType(0x30))));
    }
}

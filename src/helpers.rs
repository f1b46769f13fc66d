//! Text conversion and name matching used by the driver and the wrappers

use crate::{CanapeError, CanapeResult};

/// Encoding of the strings exchanged with the ASAP3 library
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextEncoding {
    /// ISO-8859-1, the encoding CANape uses for object names and paths
    #[default]
    Latin1,
    /// UTF-8
    Utf8,
}

impl TextEncoding {
    /// Parses an encoding name such as `latin-1` or `utf-8`
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "cp819" => Some(Self::Latin1),
            "utf-8" | "utf8" => Some(Self::Utf8),
            _ => None,
        }
    }

    /// Encodes a string for the library. The result has no terminating NUL
    pub fn encode(&self, text: &str) -> CanapeResult<Vec<u8>> {
        if text.contains('\0') {
            return Err(CanapeError::Encoding(format!("'{}' contains a NUL character", text.escape_debug())));
        }
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c))
                        .map_err(|_| CanapeError::Encoding(format!("'{c}' cannot be encoded as Latin-1")))
                })
                .collect(),
        }
    }

    /// Decodes bytes returned by the library. Decoding stops at the first NUL
    pub fn decode(&self, bytes: &[u8]) -> String {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        let bytes = &bytes[..end];
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => bytes.iter().map(|b| char::from(*b)).collect(),
        }
    }
}

/// Matches a name against a pattern with `*` (any sequence) and `?` (any single character)
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ni));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            // Let the last star swallow one more character
            pi = star + 1;
            ni = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// True if the name contains wildcard characters
pub(crate) fn has_wildcard(name: &str) -> bool {
    name.contains(['*', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_roundtrip_of_umlauts() {
        let enc = TextEncoding::Latin1;
        let bytes = enc.encode("Drehzahl_ü").unwrap();
        assert_eq!(bytes.last(), Some(&0xFC));
        assert_eq!(enc.decode(&[b'a', 0xFC, 0, b'x']), "aü");
        assert!(enc.encode("€").is_err());
        assert!(enc.encode("a\0b").is_err());
    }

    #[test]
    fn encoding_names() {
        assert_eq!(TextEncoding::from_name("Latin-1"), Some(TextEncoding::Latin1));
        assert_eq!(TextEncoding::from_name("utf_8"), Some(TextEncoding::Utf8));
        assert_eq!(TextEncoding::from_name("cp1252"), None);
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("ampl*", "ampl"));
        assert!(wildcard_match("ampl*", "amplitude"));
        assert!(wildcard_match("*.*", "map1.x"));
        assert!(wildcard_match("ma?_*8", "map_uint8"));
        assert!(!wildcard_match("ma?_*8", "map_uint16"));
        assert!(!wildcard_match("?", ""));
        assert!(wildcard_match("*", ""));
        assert!(has_wildcard("a*"));
        assert!(!has_wildcard("channel1"));
    }
}

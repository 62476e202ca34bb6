//! Distinguished name parsing.
//!
//! Directory entries hand back DNs as plain strings (`cn=ops,ou=groups,dc=example,dc=com`).
//! [`DistinguishedName`] splits them into relative distinguished names while honouring
//! backslash escapes (`\,` as well as RFC 4514 hex pairs such as `\2C`), which is all the
//! group-name extraction and DN-shape checks need.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Reasons a string is not a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// Nothing but whitespace.
    #[error("empty DN")]
    Empty,
    /// A component is empty or has no `=`.
    #[error("malformed DN component `{0}`")]
    InvalidComponent(String),
    /// Nothing before the `=`.
    #[error("DN component `{0}` has no attribute type")]
    MissingAttribute(String),
    /// Nothing after the `=`.
    #[error("DN attribute `{0}` has no value")]
    MissingValue(String),
    /// A trailing lone backslash.
    #[error("DN ends inside an escape sequence")]
    UnterminatedEscape,
}

impl From<DnError> for dirauth_core::Error {
    fn from(err: DnError) -> Self {
        dirauth_core::Error::InvalidInput(err.to_string())
    }
}

/// One `attribute=value` component of a DN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdn {
    attribute: String,
    value: String,
}

impl Rdn {
    fn from_component(component: &str) -> Result<Self, DnError> {
        let equals = unescaped_positions(component, '=')?
            .first()
            .copied()
            .ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;

        let attribute = component[..equals].trim();
        if attribute.is_empty() {
            return Err(DnError::MissingAttribute(component.to_string()));
        }
        let value = component[equals + 1..].trim();
        if value.is_empty() {
            return Err(DnError::MissingValue(attribute.to_string()));
        }

        Ok(Self {
            attribute: attribute.to_string(),
            value: unescape(value)?,
        })
    }

    /// Attribute type (e.g. `cn`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if the attribute type matches (case-insensitive).
    #[must_use]
    pub fn is(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// Parsed distinguished name. Keeps the original text for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Rdn>,
}

impl DistinguishedName {
    /// Parse a DN.
    ///
    /// # Errors
    ///
    /// Returns [`DnError`] if the input is blank or any component is malformed.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DnError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DnError::Empty);
        }

        let mut rdns = Vec::new();
        let mut start = 0;
        for comma in unescaped_positions(raw, ',')? {
            rdns.push(Rdn::from_component(raw[start..comma].trim())?);
            start = comma + 1;
        }
        rdns.push(Rdn::from_component(raw[start..].trim())?);

        Ok(Self {
            raw: raw.to_string(),
            rdns,
        })
    }

    /// The DN text as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Components in order, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Leading (leaf) component.
    #[must_use]
    pub fn first(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Number of components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// Always false for a parsed DN.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Byte offsets of every `target` not consumed by a backslash escape.
fn unescaped_positions(text: &str, target: char) -> Result<Vec<usize>, DnError> {
    let mut positions = Vec::new();
    let mut chars = text.char_indices();

    while let Some((offset, ch)) = chars.next() {
        if ch == '\\' {
            chars.next().ok_or(DnError::UnterminatedEscape)?;
        } else if ch == target {
            positions.push(offset);
        }
    }

    Ok(positions)
}

fn unescape(value: &str) -> Result<String, DnError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut rest = value;

    while let Some(backslash) = rest.find('\\') {
        bytes.extend_from_slice(&rest.as_bytes()[..backslash]);
        let escaped = &rest[backslash + 1..];

        let hex_pair = escaped
            .get(..2)
            .filter(|pair| pair.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());

        if let Some(byte) = hex_pair {
            bytes.push(byte);
            rest = &escaped[2..];
        } else {
            let ch = escaped.chars().next().ok_or(DnError::UnterminatedEscape)?;
            let mut buf = [0; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            rest = &escaped[ch.len_utf8()..];
        }
    }
    bytes.extend_from_slice(rest.as_bytes());

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

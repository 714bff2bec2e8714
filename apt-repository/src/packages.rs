//! Control stanzas and Packages index files.
//!
//! A Packages index is a sequence of control stanzas. Stanzas appended by the
//! publisher are joined with [`STANZA_SEPARATOR`]; [`split_stanzas`] accepts
//! both that separator and plain blank lines.

use crate::hash::{Digests, HashAlgorithm};
use crate::{AptRepositoryError, Result};
use std::fmt;

/// Separator placed between two stanzas when they are concatenated.
pub const STANZA_SEPARATOR: &str = "\r\n";

/// An RFC822-like block of `Field: value` lines.
///
/// Field order is preserved exactly as parsed; [`ControlStanza::set`]
/// replaces a field in place or appends it at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlStanza {
    fields: Vec<(String, String)>,
}

impl ControlStanza {
    /// Create an empty stanza.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Parse a single stanza.
    ///
    /// Continuation lines (starting with a space or tab) are attached to the
    /// preceding field, including the leading whitespace, so multi-line
    /// descriptions survive a parse/serialize cycle unchanged.
    pub fn parse(text: &str) -> Result<Self> {
        let mut stanza = Self::new();

        for line in text.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                if stanza.fields.is_empty() {
                    continue;
                }
                break;
            }
            if line.starts_with('#') {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                match stanza.fields.last_mut() {
                    Some((_, value)) => {
                        value.push('\n');
                        value.push_str(line);
                    }
                    None => {
                        return Err(AptRepositoryError::invalid_package(format!(
                            "continuation line without a field: {:?}",
                            line
                        )));
                    }
                }
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                AptRepositoryError::invalid_package(format!("invalid line format: {:?}", line))
            })?;
            let name = name.trim();
            if name.is_empty() {
                return Err(AptRepositoryError::invalid_package(format!(
                    "empty field name: {:?}",
                    line
                )));
            }
            stanza
                .fields
                .push((name.to_string(), value.trim().to_string()));
        }

        if stanza.fields.is_empty() {
            return Err(AptRepositoryError::invalid_package("empty control stanza"));
        }
        Ok(stanza)
    }

    /// Look a field up, ignoring ASCII case as dpkg does.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a field that must be present and single-line.
    pub fn require(&self, name: &str) -> Result<&str> {
        match self.get(name).map(str::trim) {
            Some(value) if !value.is_empty() && !value.contains('\n') => Ok(value),
            Some(value) => Err(AptRepositoryError::invalid_field(name, value)),
            None => Err(AptRepositoryError::missing_field(name)),
        }
    }

    /// Set a field, replacing an existing value in place.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self
            .fields
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(field) => field.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Record where a package lives in the pool and the digests of its bytes.
    pub fn set_file_fields(&mut self, filename: &str, digests: &Digests) {
        self.set("Filename", filename);
        self.set("Size", digests.size.to_string());
        for algorithm in HashAlgorithm::all() {
            self.set(algorithm.control_field(), digests.get(*algorithm));
        }
    }

    /// Iterate over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the stanza has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for ControlStanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            if value.is_empty() {
                writeln!(f, "{}:", name)?;
            } else if value.starts_with('\n') {
                writeln!(f, "{}:{}", name, value)?;
            } else {
                writeln!(f, "{}: {}", name, value)?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for ControlStanza {
    type Err = AptRepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Concatenate an existing Packages index with new stanza text.
pub fn append_stanzas(existing: &[u8], stanzas: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(existing.len() + STANZA_SEPARATOR.len() + stanzas.len());
    data.extend_from_slice(existing);
    data.extend_from_slice(STANZA_SEPARATOR.as_bytes());
    data.extend_from_slice(stanzas);
    data
}

/// Join serialized stanzas into the text of one Packages index.
pub fn join_stanzas<S: AsRef<str>>(stanzas: &[S]) -> String {
    stanzas
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(STANZA_SEPARATOR)
}

/// Split a Packages index into its stanzas.
pub fn split_stanzas(text: &str) -> Result<Vec<ControlStanza>> {
    let mut stanzas = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            if !current.is_empty() {
                stanzas.push(ControlStanza::parse(&current)?);
                current.clear();
            }
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() {
        stanzas.push(ControlStanza::parse(&current)?);
    }

    Ok(stanzas)
}

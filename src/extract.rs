//! Per-package metadata: control stanza, architecture and pool location.

use apt_repository::{hash_data, AptRepositoryError, ControlStanza};
use serde::Serialize;

use crate::error::{Error, Result};

/// Fields pulled out of a package archive by a [`PackageParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPackage {
    pub package: String,
    pub architecture: String,
    pub control: ControlStanza,
}

/// Reads the control data of a package archive.
pub trait PackageParser: Send + Sync {
    fn parse(&self, data: &[u8]) -> std::result::Result<ParsedPackage, AptRepositoryError>;
}

/// Parser for Debian binary packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebParser;

impl PackageParser for DebParser {
    fn parse(&self, data: &[u8]) -> std::result::Result<ParsedPackage, AptRepositoryError> {
        let control = apt_repository::read_binary_control(data)?;
        Ok(ParsedPackage {
            package: control.package,
            architecture: control.architecture,
            control: control.stanza,
        })
    }
}

/// Everything the index needs to know about one package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageMetadata {
    pub package: String,
    pub architecture: String,
    /// Serialized control stanza including the pool location and digests.
    pub control_stanza: String,
    /// Pool path relative to the repository base.
    pub destination_path: String,
}

/// Pool path for a package: `pool/<component>/<initial>/<package>/<filename>`.
pub fn destination_path(component: &str, package: &str, filename: &str) -> Result<String> {
    let initial = package
        .chars()
        .next()
        .ok_or_else(|| Error::parse(filename, AptRepositoryError::missing_field("Package")))?;
    if package.contains('/') || package == "." || package == ".." {
        return Err(Error::parse(
            filename,
            AptRepositoryError::invalid_field("Package", package),
        ));
    }
    Ok(format!(
        "pool/{}/{}/{}/{}",
        component, initial, package, filename
    ))
}

/// Derive [`PackageMetadata`] from the bytes of a package file.
///
/// `Filename`, `Size`, `MD5sum`, `SHA1` and `SHA256` are computed over `data`
/// and replace whatever the archive's own control data carried.
pub fn extract(
    parser: &dyn PackageParser,
    data: &[u8],
    component: &str,
    original_filename: &str,
) -> Result<PackageMetadata> {
    let filename = original_filename
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::parse(
                original_filename,
                AptRepositoryError::invalid_field("Filename", original_filename),
            )
        })?;

    let parsed = parser
        .parse(data)
        .map_err(|e| Error::parse(original_filename, e))?;
    let digests = hash_data(data);
    let destination_path = destination_path(component, &parsed.package, filename)?;

    let mut stanza = parsed.control;
    stanza.set_file_fields(&destination_path, &digests);

    Ok(PackageMetadata {
        package: parsed.package,
        architecture: parsed.architecture,
        control_stanza: stanza.to_string(),
        destination_path,
    })
}

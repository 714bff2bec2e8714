//! Reading control data out of binary package archives.
//!
//! A `.deb` is an `ar` container whose first member is `debian-binary`,
//! followed by `control.tar[.gz|.xz|.zst]` and `data.tar[...]`. Only the
//! control member is ever decompressed.

use crate::packages::ControlStanza;
use crate::{AptRepositoryError, Result};
use std::io::Read;

/// Control information of one binary package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryControl {
    /// Value of the `Package` field.
    pub package: String,
    /// Value of the `Architecture` field.
    pub architecture: String,
    /// The full control stanza, in its original field order.
    pub stanza: ControlStanza,
}

/// Parse the control stanza of a binary package.
pub fn read_binary_control(data: &[u8]) -> Result<BinaryControl> {
    let text = read_control_file(data)?;
    let stanza = ControlStanza::parse(&text)?;
    let package = stanza.require("Package")?.to_string();
    let architecture = stanza.require("Architecture")?.to_string();

    Ok(BinaryControl {
        package,
        architecture,
        stanza,
    })
}

/// Extract the raw text of the `control` file from a binary package.
pub fn read_control_file(data: &[u8]) -> Result<String> {
    let mut archive = ar::Archive::new(data);
    let mut seen_debian_binary = false;

    while let Some(entry) = archive.next_entry() {
        let mut entry =
            entry.map_err(|e| AptRepositoryError::invalid_archive(format!("ar: {}", e)))?;
        let name = String::from_utf8_lossy(entry.header().identifier())
            .trim_end_matches('/')
            .to_string();

        if name == "debian-binary" {
            let mut version = String::new();
            entry.read_to_string(&mut version)?;
            if !version.trim().starts_with("2.") {
                return Err(AptRepositoryError::invalid_archive(format!(
                    "unsupported format version {:?}",
                    version.trim()
                )));
            }
            seen_debian_binary = true;
            continue;
        }

        if let Some(suffix) = name.strip_prefix("control.tar") {
            if !seen_debian_binary {
                return Err(AptRepositoryError::invalid_archive(
                    "control member before debian-binary",
                ));
            }
            let tarball = decompressor(suffix, entry)?;
            return find_control(tarball);
        }
    }

    Err(AptRepositoryError::invalid_archive(
        "no control.tar member found",
    ))
}

fn decompressor<'a, R: Read + 'a>(suffix: &str, reader: R) -> Result<Box<dyn Read + 'a>> {
    match suffix {
        "" => Ok(Box::new(reader)),
        ".gz" => Ok(Box::new(flate2::read::GzDecoder::new(reader))),
        ".xz" => Ok(Box::new(xz2::read::XzDecoder::new(reader))),
        ".zst" => Ok(Box::new(zstd::stream::read::Decoder::new(reader)?)),
        other => Err(AptRepositoryError::invalid_archive(format!(
            "unsupported control compression {:?}",
            other
        ))),
    }
}

fn find_control<R: Read>(tarball: R) -> Result<String> {
    let mut archive = tar::Archive::new(tarball);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let is_control = path.file_name().is_some_and(|name| name == "control")
            && path
                .parent()
                .is_none_or(|parent| parent.as_os_str().is_empty() || parent.as_os_str() == ".");
        if !is_control {
            continue;
        }

        let mut text = String::new();
        entry
            .read_to_string(&mut text)
            .map_err(|_| AptRepositoryError::invalid_package("control file is not UTF-8"))?;
        return Ok(text);
    }

    Err(AptRepositoryError::invalid_archive(
        "control member has no control file",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONTROL: &str = "Package: hello\n\
Version: 2.10-3\n\
Architecture: arm64\n\
Description: example package\n";

    fn tar_with(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn deb_with(members: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut builder = ar::Builder::new(Vec::new());
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, &data[..]).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_read_gzip_control() {
        let control = gzip(&tar_with(&[
            ("./md5sums", b"".as_slice()),
            ("./control", CONTROL.as_bytes()),
        ]));
        let deb = deb_with(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar.gz", control),
            ("data.tar.gz", gzip(&tar_with(&[]))),
        ]);

        let parsed = read_binary_control(&deb).unwrap();
        assert_eq!(parsed.package, "hello");
        assert_eq!(parsed.architecture, "arm64");
        assert_eq!(parsed.stanza.to_string(), CONTROL);
    }

    #[test]
    fn test_read_uncompressed_control() {
        let deb = deb_with(&[
            ("debian-binary", b"2.0\n".to_vec()),
            ("control.tar", tar_with(&[("control", CONTROL.as_bytes())])),
        ]);
        assert_eq!(read_control_file(&deb).unwrap(), CONTROL);
    }

    #[test]
    fn test_missing_architecture_is_rejected() {
        let deb = deb_with(&[
            ("debian-binary", b"2.0\n".to_vec()),
            (
                "control.tar",
                tar_with(&[("./control", b"Package: hello\n".as_slice())]),
            ),
        ]);
        assert!(matches!(
            read_binary_control(&deb),
            Err(AptRepositoryError::MissingField(field)) if field == "Architecture"
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(read_control_file(b"definitely not a package").is_err());
        let deb = deb_with(&[("debian-binary", b"2.0\n".to_vec())]);
        assert!(matches!(
            read_control_file(&deb),
            Err(AptRepositoryError::InvalidArchive(_))
        ));
    }
}

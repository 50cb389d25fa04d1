use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, Cursor};
use std::path::Path;

use encoding_rs::{Encoding, UTF_8};
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use zip::read::ZipArchive;

use crate::error::{Error, Result};

type PseudoFile = Cursor<Vec<u8>>;

lazy_static! {
    static ref DECLARED_ENCODING: Regex =
        Regex::new(r#"^\x{FEFF}?\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#).unwrap();
}

fn has_extension(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

fn entry_to_pseudofile<R: Read>(mut entry: R, size: u64) -> Result<PseudoFile> {
    let mut tmp = Cursor::new(Vec::with_capacity(size as usize));
    entry.read_to_end(tmp.get_mut())?;
    Ok(tmp)
}

fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let label = DECLARED_ENCODING.captures(&head)?.get(1)?.as_str();
    let encoding = Encoding::for_label(label.as_bytes());
    if encoding.is_none() {
        warn!("unsupported document encoding '{}', reading as UTF-8", label);
    }
    encoding
}

// Some SIA exports are declared ISO-8859-1.
fn pseudofile_to_string(file: PseudoFile) -> String {
    let bytes = file.into_inner();
    let encoding = declared_encoding(&bytes).unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!(
            "document is not valid {}, undecodable bytes replaced with U+FFFD",
            used.name()
        );
    }
    text.into_owned()
}

/// Returns the first XML document in the archive, descending into archives
/// nested inside it.
pub fn read_archive<R: Read + Seek>(reader: R) -> Result<String> {
    let mut archive = ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let size = entry.size();

        if has_extension(&name, "xml") {
            info!("reading {} from archive", name);
            return Ok(pseudofile_to_string(entry_to_pseudofile(entry, size)?));
        }
        if has_extension(&name, "zip") {
            let inner = entry_to_pseudofile(entry, size)?;
            match read_archive(inner) {
                Ok(document) => return Ok(document),
                Err(Error::Document { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }
    Err(Error::document("archive contains no XML document"))
}

pub fn read_document<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path)?;

    if path
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("zip"))
    {
        read_archive(BufReader::new(file))
    } else {
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(pseudofile_to_string(entry_to_pseudofile(file, size)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::{FileOptions, ZipWriter};

    fn zipped(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn finds_xml_entry() {
        let bytes = zipped(&[
            ("README.txt", &b"hello"[..]),
            ("AIXM4.5_all_FR_OM_2025-11-27.xml", &b"<root/>"[..]),
        ]);
        assert_eq!(read_archive(Cursor::new(bytes)).unwrap(), "<root/>");
    }

    #[test]
    fn descends_into_nested_archives() {
        let inner = zipped(&[("XML_SIA.xml", &b"<AIXM-Snapshot/>"[..])]);
        let outer = zipped(&[("data/XML_SIA.zip", inner.as_slice())]);
        assert_eq!(read_archive(Cursor::new(outer)).unwrap(), "<AIXM-Snapshot/>");
    }

    #[test]
    fn archive_without_xml_is_a_document_error() {
        let bytes = zipped(&[("notes.txt", &b"nothing here"[..])]);
        assert!(matches!(
            read_archive(Cursor::new(bytes)),
            Err(Error::Document { .. })
        ));
    }

    #[test]
    fn declared_latin1_is_decoded() {
        let document = &b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><txtName>A\xe9rodrome</txtName>"[..];
        let bytes = zipped(&[("XML_SIA.xml", document)]);
        let text = read_archive(Cursor::new(bytes)).unwrap();
        assert!(text.ends_with("<txtName>A\u{e9}rodrome</txtName>"), "{}", text);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let text = pseudofile_to_string(Cursor::new(b"<root>\xff</root>".to_vec()));
        assert_eq!(text, "<root>\u{fffd}</root>");

        let declared = b"<?xml version='1.0' encoding='UTF-8'?><n>\xc3\xa9</n>".to_vec();
        assert!(pseudofile_to_string(Cursor::new(declared)).ends_with("<n>\u{e9}</n>"));
    }

    #[test]
    fn not_an_archive() {
        assert!(matches!(
            read_archive(Cursor::new(b"plain text".to_vec())),
            Err(Error::Zip { .. })
        ));
    }
}

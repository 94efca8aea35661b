//! Monthly archive unpacking.

use std::io::{Cursor, Read};

use tenderwatch_shared::{Result, TenderWatchError};
use tracing::{debug, info, instrument};

/// Text content of one feed document inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Member name inside the archive.
    pub name: String,
    pub text: String,
}

/// Whether an archive member is a tender feed document.
///
/// The name must end in `.atom` and mention either `licitaciones` or
/// `completo` (case-insensitive).
pub fn is_feed_member(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".atom") && (lower.contains("licitaciones") || lower.contains("completo"))
}

/// Decompress a zip payload and return every qualifying feed document in
/// archive order.
///
/// Fails with an archive error if the payload is not a readable zip or if it
/// holds no qualifying member.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn unpack(bytes: &[u8]) -> Result<Vec<RawDocument>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| TenderWatchError::archive(format!("cannot open archive: {e}")))?;

    let mut documents = Vec::new();
    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|e| TenderWatchError::archive(format!("cannot read member {index}: {e}")))?;

        let name = member.name().to_string();
        if member.is_dir() || !is_feed_member(&name) {
            debug!(%name, "skipping archive member");
            continue;
        }

        let mut buf = Vec::with_capacity(usize::try_from(member.size()).unwrap_or_default());
        member
            .read_to_end(&mut buf)
            .map_err(|e| TenderWatchError::archive(format!("cannot decompress {name}: {e}")))?;

        debug!(%name, bytes = buf.len(), "read feed document");
        documents.push(RawDocument {
            name,
            text: String::from_utf8_lossy(&buf).into_owned(),
        });
    }

    if documents.is_empty() {
        return Err(TenderWatchError::archive("no .atom feed documents in archive"));
    }

    info!(documents = documents.len(), "archive unpacked");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_zip(members: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn member_name_rules() {
        assert!(is_feed_member("licitacionesPerfilesContratanteCompleto3.atom"));
        assert!(is_feed_member("Completo_2.ATOM"));
        assert!(!is_feed_member("licitaciones.xml"));
        assert!(!is_feed_member("otros.atom"));
    }

    #[test]
    fn unpack_keeps_archive_order() {
        let bytes = build_zip(&[
            ("licitacionesPerfilesContratanteCompleto3.atom", "<feed>first</feed>"),
            ("readme.txt", "ignored"),
            ("licitacionesPerfilesContratanteCompleto3_1.atom", "<feed>second</feed>"),
        ]);

        let docs = unpack(&bytes).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "<feed>first</feed>");
        assert_eq!(docs[1].name, "licitacionesPerfilesContratanteCompleto3_1.atom");
    }

    #[test]
    fn unpack_without_feed_members_fails() {
        let bytes = build_zip(&[("readme.txt", "nothing here")]);
        let err = unpack(&bytes).unwrap_err();
        assert!(matches!(err, TenderWatchError::Archive { .. }));
    }

    #[test]
    fn unpack_rejects_garbage() {
        let err = unpack(b"definitely not a zip").unwrap_err();
        assert!(err.to_string().contains("cannot open archive"));
    }
}

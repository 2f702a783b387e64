//! Directory entries
//!
//! One dirent per article. A dirent either points at a blob inside a cluster
//! or redirects to another dirent by position.
//!
//! Record layout (little-endian):
//!
//! ```text
//! namespace u8 | mime u16 | param-len varint
//!   | redirect u32                      (mime == 0xFFFF)
//!   | cluster varint | blob varint      (otherwise)
//!   | title-len varint | title | url-len varint | url | param
//! ```

use crate::core::error::{ArchiveError, Result};
use crate::core::io::RecordReader;
use crate::core::varint;
use serde::Serialize;

/// MIME index marking a redirect record
pub const REDIRECT_MIME: u16 = 0xFFFF;

/// What a dirent refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirentKind {
    Content {
        mime_type: u16,
        cluster: u32,
        blob: u32,
    },
    Redirect {
        target: u32,
    },
}

/// Decoded directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dirent {
    position: u32,
    namespace: char,
    #[serde(flatten)]
    kind: DirentKind,
    /// Stored title; empty when it equals the URL
    title: String,
    url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameter: Vec<u8>,
}

impl Dirent {
    /// Content entry at `position`
    pub fn content(
        position: u32,
        namespace: char,
        url: impl Into<String>,
        title: impl Into<String>,
        mime_type: u16,
        cluster: u32,
        blob: u32,
    ) -> Self {
        Dirent {
            position,
            namespace,
            kind: DirentKind::Content {
                mime_type,
                cluster,
                blob,
            },
            title: title.into(),
            url: url.into(),
            parameter: Vec::new(),
        }
    }

    /// Redirect entry at `position` pointing at `target`
    pub fn redirect(
        position: u32,
        namespace: char,
        url: impl Into<String>,
        title: impl Into<String>,
        target: u32,
    ) -> Self {
        Dirent {
            position,
            namespace,
            kind: DirentKind::Redirect { target },
            title: title.into(),
            url: url.into(),
            parameter: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, parameter: Vec<u8>) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn namespace(&self) -> char {
        self.namespace
    }

    pub fn kind(&self) -> &DirentKind {
        &self.kind
    }

    /// Title, falling back to the URL when none is stored
    pub fn title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `namespace/url`
    pub fn long_url(&self) -> String {
        format!("{}/{}", self.namespace, self.url)
    }

    /// Opaque extra data carried by the record
    pub fn parameter(&self) -> &[u8] {
        &self.parameter
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.kind, DirentKind::Redirect { .. })
    }

    pub fn redirect_target(&self) -> Option<u32> {
        match self.kind {
            DirentKind::Redirect { target } => Some(target),
            DirentKind::Content { .. } => None,
        }
    }

    /// `(cluster, blob)` of a content entry
    pub fn cluster_blob(&self) -> Option<(u32, u32)> {
        match self.kind {
            DirentKind::Content { cluster, blob, .. } => Some((cluster, blob)),
            DirentKind::Redirect { .. } => None,
        }
    }

    pub fn mime_type(&self) -> Option<u16> {
        match self.kind {
            DirentKind::Content { mime_type, .. } => Some(mime_type),
            DirentKind::Redirect { .. } => None,
        }
    }

    /// Decode the record starting at `bytes[0]`, which sits at file offset
    /// `offset`
    pub fn decode(bytes: &[u8], offset: u64, position: u32) -> Result<Self> {
        let mut reader = RecordReader::new(bytes, offset);

        let namespace = char::from(reader.u8()?);
        let mime = reader.u16()?;
        let param_len = reader.varint()?;

        let kind = if mime == REDIRECT_MIME {
            DirentKind::Redirect {
                target: reader.u32()?,
            }
        } else {
            DirentKind::Content {
                mime_type: mime,
                cluster: reader.varint_u32()?,
                blob: reader.varint_u32()?,
            }
        };

        let title = text(&mut reader, "title")?;
        let url = text(&mut reader, "URL")?;

        let param_len = usize::try_from(param_len)
            .map_err(|_| ArchiveError::corrupt_index(offset, "parameter length too large"))?;
        let parameter = reader.bytes(param_len)?.to_vec();

        Ok(Dirent {
            position,
            namespace,
            kind,
            title,
            url,
            parameter,
        })
    }

    /// Append the encoded record to `out`
    ///
    /// A title equal to the URL is stored empty.
    pub fn encode(&self, out: &mut Vec<u8>) {
        // Namespaces are single bytes; the builder only accepts ASCII
        out.push(self.namespace as u8);

        match self.kind {
            DirentKind::Redirect { target } => {
                out.extend_from_slice(&REDIRECT_MIME.to_le_bytes());
                varint::encode(self.parameter.len() as u64, out);
                out.extend_from_slice(&target.to_le_bytes());
            }
            DirentKind::Content {
                mime_type,
                cluster,
                blob,
            } => {
                out.extend_from_slice(&mime_type.to_le_bytes());
                varint::encode(self.parameter.len() as u64, out);
                varint::encode(u64::from(cluster), out);
                varint::encode(u64::from(blob), out);
            }
        }

        let title = if self.title == self.url { "" } else { &self.title };
        varint::encode(title.len() as u64, out);
        out.extend_from_slice(title.as_bytes());
        varint::encode(self.url.len() as u64, out);
        out.extend_from_slice(self.url.as_bytes());
        out.extend_from_slice(&self.parameter);
    }
}

fn text(reader: &mut RecordReader<'_>, field: &str) -> Result<String> {
    let at = reader.offset();
    let bytes = reader.prefixed()?;
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ArchiveError::corrupt_index(at, format!("{} is not valid UTF-8", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_encoded(dirent: &Dirent) -> Dirent {
        let mut buf = Vec::new();
        dirent.encode(&mut buf);
        Dirent::decode(&buf, 0, dirent.position()).unwrap()
    }

    #[test]
    fn test_content_entry() {
        let dirent = Dirent::content(4, 'A', "Cat", "The Cat", 2, 300, 17);
        let decoded = decode_encoded(&dirent);

        assert_eq!(decoded, dirent);
        assert_eq!(decoded.cluster_blob(), Some((300, 17)));
        assert_eq!(decoded.mime_type(), Some(2));
        assert!(!decoded.is_redirect());
        assert_eq!(decoded.long_url(), "A/Cat");
    }

    #[test]
    fn test_redirect_entry() {
        let dirent = Dirent::redirect(1, 'A', "Kitty", "", 4);
        let decoded = decode_encoded(&dirent);

        assert!(decoded.is_redirect());
        assert_eq!(decoded.redirect_target(), Some(4));
        assert_eq!(decoded.cluster_blob(), None);
        assert_eq!(decoded.mime_type(), None);
    }

    #[test]
    fn test_title_falls_back_to_url() {
        let dirent = Dirent::content(0, 'A', "Dog", "", 0, 0, 0);
        assert_eq!(dirent.title(), "Dog");

        // A title identical to the URL is stored empty
        let same = Dirent::content(0, 'A', "Dog", "Dog", 0, 0, 0);
        let mut buf = Vec::new();
        same.encode(&mut buf);
        let mut expected = Vec::new();
        dirent.encode(&mut expected);
        assert_eq!(buf, expected);
        assert_eq!(decode_encoded(&same).title(), "Dog");
    }

    #[test]
    fn test_parameter_bytes() {
        let dirent = Dirent::content(0, 'M', "Counter", "", 1, 0, 0).with_parameter(vec![9, 8, 7]);
        assert_eq!(decode_encoded(&dirent).parameter(), &[9u8, 8, 7]);
    }

    #[test]
    fn test_truncated_record() {
        let mut buf = Vec::new();
        Dirent::content(0, 'A', "Truncated", "", 0, 0, 0).encode(&mut buf);
        buf.truncate(buf.len() - 3);

        assert!(matches!(
            Dirent::decode(&buf, 1000, 0),
            Err(ArchiveError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_title() {
        let mut buf = vec![b'A'];
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&[0, 0, 0]);
        buf.extend_from_slice(&[2, 0xC3, 0x28]);
        buf.extend_from_slice(&[1, b'x']);

        assert!(matches!(
            Dirent::decode(&buf, 0, 0),
            Err(ArchiveError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_cluster_number_overflow() {
        let mut buf = vec![b'A'];
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.push(0);
        varint::encode(u64::from(u32::MAX) + 1, &mut buf);
        buf.push(0);

        assert!(matches!(
            Dirent::decode(&buf, 0, 0),
            Err(ArchiveError::CorruptIndex { .. })
        ));
    }
}

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::assistant::messages::FileReference;
use crate::error::AttachmentError;

const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("pdf", "application/pdf"),
];

/// File picked by the user for the next message. Lives only until uploaded;
/// afterwards only its URL is kept in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttachment {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl FileAttachment {
    /// Wraps raw bytes, deriving the MIME type from the file extension.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, AttachmentError> {
        let name = name.into();
        let mime_type = mime_for(&name).ok_or_else(|| AttachmentError::Unsupported(name.clone()))?;
        Ok(Self {
            name,
            mime_type: mime_type.to_string(),
            bytes,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AttachmentError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if mime_for(&name).is_none() {
            return Err(AttachmentError::Unsupported(name));
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AttachmentError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_bytes(name, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 payload sent to the chat proxy.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }

    /// Local preview reference used before the upload finishes.
    pub fn preview(&self) -> FileReference {
        FileReference {
            url: self.data_url(),
            mime_type: self.mime_type.clone(),
            name: self.name.clone(),
        }
    }
}

fn mime_for(name: &str) -> Option<&'static str> {
    let extension = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, mime)| *mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_extension() {
        let pdf = FileAttachment::from_bytes("Relatorio.PDF", b"%PDF".to_vec()).unwrap();
        assert_eq!(pdf.mime_type(), "application/pdf");

        let audio = FileAttachment::from_bytes("sessao.mp3", vec![0, 1]).unwrap();
        assert_eq!(audio.mime_type(), "audio/mpeg");
    }

    #[test]
    fn unsupported_types_are_rejected() {
        let err = FileAttachment::from_bytes("notes.txt", b"hi".to_vec()).unwrap_err();
        assert!(matches!(err, AttachmentError::Unsupported(name) if name == "notes.txt"));
    }

    #[test]
    fn preview_is_a_data_url() {
        let image = FileAttachment::from_bytes("a.png", b"abc".to_vec()).unwrap();
        let preview = image.preview();
        assert_eq!(preview.url, "data:image/png;base64,YWJj");
        assert_eq!(preview.name, "a.png");
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let err = FileAttachment::from_path("/nonexistent/legis/file.pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/legis/file.pdf"));
    }
}

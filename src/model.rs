//! Data handed between workflow stages.
//!
//! Each type here is owned by exactly one stage at a time:
//!
//! ```text
//! RawUploadFile ──upload──▶ ProcessedFields ──review──▶ ValidatedReviewPayload
//!                                                              │
//!                                    GeneratedArtifactRef ◀──submit
//! ```

use crate::review::certidoes;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// The only media type the upload gate accepts.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Fallback media type for files we cannot classify.
pub const OCTET_STREAM: &str = "application/octet-stream";

// ── Upload input ─────────────────────────────────────────────────────────

/// A file the user selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct RawUploadFile {
    /// Display name, sent as the multipart filename.
    pub name: String,
    /// Declared media type, e.g. `application/pdf`.
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for RawUploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawUploadFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl RawUploadFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read a file from disk and declare its media type from its content.
    ///
    /// Content that starts with the `%PDF` magic bytes is declared as
    /// `application/pdf` regardless of extension; anything else falls back to
    /// an extension lookup.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.pdf".to_string());
        let media_type = sniff_media_type(&bytes, &name).to_string();
        Ok(Self {
            name,
            media_type,
            bytes,
        })
    }

    /// Whether the declared media type passes the upload gate.
    pub fn is_pdf(&self) -> bool {
        self.media_type == PDF_MEDIA_TYPE
    }
}

/// Classify a file by magic bytes, then by extension.
pub fn sniff_media_type(bytes: &[u8], name: &str) -> &'static str {
    if bytes.starts_with(b"%PDF") {
        return PDF_MEDIA_TYPE;
    }
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "odt" => "application/vnd.oasis.opendocument.text",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => OCTET_STREAM,
    }
}

// ── Processed fields ─────────────────────────────────────────────────────

/// The certidões attribute as delivered by the server.
///
/// The extraction service sends either the raw text it found or a list it
/// already split and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CertidoesValue {
    List(Vec<String>),
    Raw(String),
}

impl Default for CertidoesValue {
    fn default() -> Self {
        CertidoesValue::Raw(String::new())
    }
}

impl CertidoesValue {
    /// Editable text form: lists are rendered with `", "`.
    pub fn to_text(&self) -> String {
        match self {
            CertidoesValue::Raw(s) => s.clone(),
            CertidoesValue::List(items) => certidoes::join(items),
        }
    }
}

/// Fields the server extracted from an uploaded PDF.
///
/// Missing or `null` attributes deserialize to empty values, leaving the
/// review stage to flag them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessedFields {
    #[serde(deserialize_with = "null_as_default")]
    pub numero_processo: String,
    #[serde(deserialize_with = "null_as_default")]
    pub requerente: String,
    #[serde(deserialize_with = "null_as_default")]
    pub parentesco: String,
    #[serde(deserialize_with = "null_as_default")]
    pub nome_falecido: String,
    #[serde(deserialize_with = "null_as_default")]
    pub local_obito: String,
    /// Free-form at this stage; normalised to `DD/MM/YYYY` by review.
    #[serde(deserialize_with = "null_as_default")]
    pub data: String,
    #[serde(deserialize_with = "null_as_default")]
    pub id_parecer: String,
    #[serde(deserialize_with = "null_as_default")]
    pub id_declaracao: String,
    #[serde(deserialize_with = "null_as_default")]
    pub id_certidoes: CertidoesValue,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Validated payload ────────────────────────────────────────────────────

/// Review data that passed every field rule.
///
/// Only [`crate::review::ReviewForm::validate`] can build one, so holding a
/// value of this type is proof that the data is submittable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedReviewPayload {
    numero_processo: String,
    requerente: String,
    parentesco: String,
    nome_falecido: String,
    local_obito: String,
    data: String,
    id_parecer: String,
    id_declaracao: String,
    id_certidoes: Vec<String>,
}

impl ValidatedReviewPayload {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_unchecked(
        numero_processo: String,
        requerente: String,
        parentesco: String,
        nome_falecido: String,
        local_obito: String,
        data: String,
        id_parecer: String,
        id_declaracao: String,
        id_certidoes: Vec<String>,
    ) -> Self {
        Self {
            numero_processo,
            requerente,
            parentesco,
            nome_falecido,
            local_obito,
            data,
            id_parecer,
            id_declaracao,
            id_certidoes,
        }
    }

    pub fn numero_processo(&self) -> &str {
        &self.numero_processo
    }
    pub fn requerente(&self) -> &str {
        &self.requerente
    }
    pub fn parentesco(&self) -> &str {
        &self.parentesco
    }
    pub fn nome_falecido(&self) -> &str {
        &self.nome_falecido
    }
    pub fn local_obito(&self) -> &str {
        &self.local_obito
    }
    /// Date of death, `DD/MM/YYYY`.
    pub fn data(&self) -> &str {
        &self.data
    }
    pub fn id_parecer(&self) -> &str {
        &self.id_parecer
    }
    pub fn id_declaracao(&self) -> &str {
        &self.id_declaracao
    }
    /// Deduplicated, never empty.
    pub fn id_certidoes(&self) -> &[String] {
        &self.id_certidoes
    }

    /// Convert back into the processed shape, e.g. to reopen the form.
    pub fn to_processed(&self) -> ProcessedFields {
        ProcessedFields {
            numero_processo: self.numero_processo.clone(),
            requerente: self.requerente.clone(),
            parentesco: self.parentesco.clone(),
            nome_falecido: self.nome_falecido.clone(),
            local_obito: self.local_obito.clone(),
            data: self.data.clone(),
            id_parecer: self.id_parecer.clone(),
            id_declaracao: self.id_declaracao.clone(),
            id_certidoes: CertidoesValue::List(self.id_certidoes.clone()),
        }
    }
}

// ── Generated artifact ───────────────────────────────────────────────────

/// Server-assigned reference to a generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifactRef {
    /// File name to request from `/download/{filename}`.
    pub filename: String,
    /// Download path the server advertised, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl GeneratedArtifactRef {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            download_url: None,
        }
    }
}

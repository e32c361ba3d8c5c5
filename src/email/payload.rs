//! Payload builder: provider request bodies
//!
//! Without attachments a body is plain `application/x-www-form-urlencoded`.
//! With attachments it becomes `multipart/form-data`, where each form field
//! is one part and each attachment one indexed `attachment[i]` part:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<key>"\r\n\r\n
//! <value>\r\n
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="attachment[0]"; filename="<name>"\r\n\r\n
//! <bytes>\r\n
//! --<boundary>--\r\n
//! ```

use crate::domain::{Attachment, EmailAddress};
use lazy_static::lazy_static;
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

lazy_static! {
    static ref SCRIPT_OR_STYLE: Regex =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("valid script/style pattern");
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern");
}

/// Strip markup for the plain-text alternative of an HTML body.
///
/// Script and style elements are removed with their content, every other tag
/// is removed and its text kept.
pub fn strip_tags(html: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE.replace_all(html, "");
    TAG.replace_all(&without_blocks, "").trim().to_string()
}

/// Split a body into its (text, html) variants.
pub fn body_variants(body: &str, is_html: bool) -> (String, String) {
    if is_html {
        (strip_tags(body), body.to_string())
    } else {
        (body.to_string(), String::new())
    }
}

/// Render recipients as a comma-joined list of `Name <email>` or `email`.
///
/// Entries without an email address are dropped.
pub fn render_recipients(recipients: &[EmailAddress]) -> String {
    recipients
        .iter()
        .filter_map(|r| {
            let email = r.email.trim();
            if email.is_empty() {
                return None;
            }
            match r.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => Some(format!("{} <{}>", name, email)),
                None => Some(email.to_string()),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Number of recipients [`render_recipients`] keeps, for auditing drops.
pub fn rendered_recipient_count(recipients: &[EmailAddress]) -> usize {
    recipients
        .iter()
        .filter(|r| !r.email.trim().is_empty())
        .count()
}

/// Ordered form fields of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// Push only when the value is non-empty
    pub fn push_non_empty(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        if !value.is_empty() {
            self.0.push((key.into(), value));
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    pub name: String,
    pub content: Vec<u8>,
}

/// Attachment parts and the boundary that will separate them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPayload {
    pub boundary: String,
    pub parts: Vec<AttachmentPart>,
}

impl AttachmentPayload {
    /// Returns `None` when there is nothing to attach.
    pub fn new(parts: Vec<AttachmentPart>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        Some(Self {
            boundary: generate_boundary(),
            parts,
        })
    }
}

/// Random boundary: hex SHA-256 of fresh random bytes, independent of content.
pub fn generate_boundary() -> String {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    hex::encode(Sha256::digest(seed))
}

/// Load attachment content, skipping files that cannot be read.
pub async fn load_attachments(attachments: &[Attachment]) -> Vec<AttachmentPart> {
    let mut parts = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        match attachment {
            Attachment::Path(path) => {
                let name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        tracing::warn!(path = %path.display(), "Skipping attachment without a file name");
                        continue;
                    }
                };
                match tokio::fs::read(path).await {
                    Ok(content) => parts.push(AttachmentPart { name, content }),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable attachment");
                    }
                }
            }
            Attachment::Blob { name, content } => {
                if name.trim().is_empty() {
                    tracing::warn!("Skipping in-memory attachment without a name");
                    continue;
                }
                parts.push(AttachmentPart {
                    name: name.clone(),
                    content: content.clone(),
                });
            }
        }
    }

    parts
}

/// A fully rendered request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Form(FormFields),
    Multipart {
        fields: FormFields,
        attachments: AttachmentPayload,
    },
}

impl Payload {
    pub fn build(fields: FormFields, attachments: Option<AttachmentPayload>) -> Self {
        match attachments {
            Some(attachments) => Payload::Multipart {
                fields,
                attachments,
            },
            None => Payload::Form(fields),
        }
    }

    pub fn content_type(&self) -> String {
        match self {
            Payload::Form(_) => FORM_CONTENT_TYPE.to_string(),
            Payload::Multipart { attachments, .. } => {
                format!("multipart/form-data; boundary={}", attachments.boundary)
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Form(fields) => url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(fields.iter())
                .finish()
                .into_bytes(),
            Payload::Multipart {
                fields,
                attachments,
            } => encode_multipart(fields, attachments),
        }
    }
}

/// Percent-encode characters that would end a quoted header parameter.
fn quote_param(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn encode_multipart(fields: &FormFields, attachments: &AttachmentPayload) -> Vec<u8> {
    let boundary = &attachments.boundary;
    let mut body = Vec::new();

    for (key, value) in fields.iter() {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                quote_param(key)
            )
            .as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for (index, part) in attachments.parts.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"attachment[{}]\"; filename=\"{}\"\r\n\r\n",
                index,
                quote_param(&part.name)
            )
            .as_bytes(),
        );
        body.extend_from_slice(&part.content);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

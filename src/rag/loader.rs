//! Knowledge document loader.
//!
//! Fetches the single source document the assistant answers from. HTTP(S)
//! URLs go through `reqwest`; `file://` URLs and bare paths are read from
//! disk. HTML is reduced to plain text with its heading and list structure
//! rewritten as Markdown markers so the chunker's separators still apply.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;

use super::error::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Html,
    PlainText,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub source: String,
    pub kind: DocumentKind,
    pub text: String,
}

pub struct DocumentLoader {
    client: reqwest::Client,
}

impl DocumentLoader {
    pub fn new(timeout: Duration) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::load("<client>", e))?;
        Ok(Self { client })
    }

    /// Load and clean a document. An empty result is an error, never an empty knowledge base.
    pub async fn load(&self, url: &str) -> Result<LoadedDocument, RagError> {
        let (kind, body) = if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_remote(url).await?
        } else {
            read_local(url).await?
        };

        let text = match kind {
            DocumentKind::Html => strip_html_tags(&body),
            DocumentKind::PlainText => normalize_whitespace(&body),
        };

        if text.trim().is_empty() {
            return Err(RagError::EmptyDocument(url.to_string()));
        }

        tracing::info!(
            "Loaded {} ({:?}, {} chars)",
            url,
            kind,
            text.chars().count()
        );

        Ok(LoadedDocument {
            source: url.to_string(),
            kind,
            text,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<(DocumentKind, String), RagError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::load(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::load(url, format!("HTTP status {}", status)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        let bytes = response.bytes().await.map_err(|e| RagError::load(url, e))?;
        let body = String::from_utf8(bytes.to_vec())
            .map_err(|_| RagError::load(url, "body is not valid UTF-8 text"))?;

        let kind = classify(content_type.as_deref(), &body).map_err(|e| RagError::load(url, e))?;
        Ok((kind, body))
    }
}

async fn read_local(url: &str) -> Result<(DocumentKind, String), RagError> {
    let path = url.strip_prefix("file://").unwrap_or(url);
    let body = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RagError::load(url, e))?;

    let by_extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let kind = match by_extension.as_deref() {
        Some("html") | Some("htm") => DocumentKind::Html,
        _ if looks_like_html(&body) => DocumentKind::Html,
        _ => DocumentKind::PlainText,
    };
    Ok((kind, body))
}

fn classify(content_type: Option<&str>, body: &str) -> Result<DocumentKind, String> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match mime.as_deref() {
        Some("text/html") | Some("application/xhtml+xml") => Ok(DocumentKind::Html),
        Some(m) if m.starts_with("text/") => Ok(if looks_like_html(body) {
            DocumentKind::Html
        } else {
            DocumentKind::PlainText
        }),
        None | Some("application/octet-stream") => Ok(if looks_like_html(body) {
            DocumentKind::Html
        } else {
            DocumentKind::PlainText
        }),
        Some(other) => Err(format!("unsupported content type {}", other)),
    }
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(1024).collect::<String>().to_ascii_lowercase();
    head.contains("<html") || head.contains("<!doctype html") || head.contains("<body")
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

/// Reduce HTML to text, keeping headings and list items as `#`/`-` lines.
pub fn strip_html_tags(html: &str) -> String {
    static INVISIBLE: OnceLock<Regex> = OnceLock::new();
    static HEADING: OnceLock<Regex> = OnceLock::new();
    static LIST_ITEM: OnceLock<Regex> = OnceLock::new();
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();

    let text = regex(
        &INVISIBLE,
        r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>",
    )
    .replace_all(html, " ");

    let text = regex(&HEADING, r"(?i)<h([1-6])\b[^>]*>").replace_all(&text, |caps: &regex::Captures| {
        let level = caps[1].parse::<usize>().unwrap_or(1).min(3);
        format!("\n{} ", "#".repeat(level))
    });
    let text = regex(&LIST_ITEM, r"(?i)<li\b[^>]*>").replace_all(&text, "\n- ");
    let text = regex(
        &BLOCK,
        r"(?i)<br\s*/?>|</?(p|div|tr|table|ul|ol|section|article|h[1-6]|li|pre|blockquote)\b[^>]*>",
    )
    .replace_all(&text, "\n");
    let text = regex(&TAG, r"(?s)<[^>]*>").replace_all(&text, "");

    normalize_whitespace(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();

    let text = regex(&NUMERIC, r"&#(x[0-9a-fA-F]+|[0-9]+);").replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&laquo;", "«")
        .replace("&raquo;", "»")
        .replace("&mdash;", "—")
        .replace("&ndash;", "–")
        .replace("&amp;", "&")
}

/// Trim every line, collapse inner runs of spaces and drop blank lines.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

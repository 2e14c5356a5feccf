//! Source extraction: turns uploaded bytes or fetched pages into plain text.
//!
//! The store only ever sees already-extracted text ([`SourceContent`]).
//! This module is the adapter callers use before ingestion: PDF pages via
//! `pdf-extract`, DOCX runs via `zip` + `quick-xml`, HTML pages reduced to
//! their visible text, and plain text decoded as UTF-8.

use std::io::Read;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;
use crate::models::{SourceContent, SourceKind};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Elements whose content is never visible text.
const HIDDEN_HTML_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("text is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
}

/// Extract text from raw source bytes according to `kind`.
///
/// PDF sources keep their page structure; everything else is one body of
/// text. `Url` bytes are treated as a fetched HTML page.
pub fn extract_bytes(kind: SourceKind, bytes: &[u8]) -> Result<SourceContent, ExtractError> {
    match kind {
        SourceKind::DocumentPdf => extract_pdf_pages(bytes).map(SourceContent::Pages),
        SourceKind::DocumentDocx => extract_docx(bytes).map(SourceContent::Text),
        SourceKind::Url => Ok(SourceContent::Text(html_to_text(&String::from_utf8_lossy(
            bytes,
        )))),
        SourceKind::PlainText | SourceKind::PastedText => std::str::from_utf8(bytes)
            .map(|s| SourceContent::Text(s.to_string()))
            .map_err(|e| ExtractError::Encoding(e.to_string())),
    }
}

pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Docx(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Docx(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Extract the text runs of `word/document.xml`, one line per paragraph.
pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => out.push(' '),
                b"br" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim().to_string())
}

/// Reduce an HTML page to its visible text.
///
/// Tags are dropped, `script`/`style`-like elements lose their content, the
/// common entities are decoded, and whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut rest = html;
    let mut hidden: Option<&str> = None;

    while let Some(open) = rest.find('<') {
        if hidden.is_none() {
            out.push_str(&rest[..open]);
        }
        let after = &rest[open..];
        let close = match after.find('>') {
            Some(i) => i,
            None => {
                rest = "";
                break;
            }
        };
        let tag = after[1..close].trim().to_ascii_lowercase();
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        match hidden {
            Some(h) if tag.starts_with('/') && name == h => hidden = None,
            Some(_) => {}
            None => {
                if !tag.starts_with('/') && !tag.ends_with('/') {
                    hidden = HIDDEN_HTML_ELEMENTS.iter().copied().find(|h| *h == name);
                }
                // Block boundaries separate words that would otherwise touch.
                out.push(' ');
            }
        }
        rest = &after[close + 1..];
    }
    if hidden.is_none() {
        out.push_str(rest);
    }

    decode_entities(&out)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Fetch a web page and return its visible text.
pub async fn fetch_url_text(url: &str, cfg: &FetchConfig) -> Result<String, ExtractError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;

    if let Some(len) = resp.content_length() {
        if len as usize > cfg.max_bytes {
            return Err(ExtractError::Fetch(format!(
                "{} is {} bytes, over the {} byte limit",
                url, len, cfg.max_bytes
            )));
        }
    }

    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| ExtractError::Fetch(e.to_string()))?;
    if bytes.len() > cfg.max_bytes {
        return Err(ExtractError::Fetch(format!(
            "{} exceeds the {} byte limit",
            url, cfg.max_bytes
        )));
    }

    debug!(url, bytes = bytes.len(), is_html, "fetched page");
    let body = String::from_utf8_lossy(&bytes);
    Ok(if is_html {
        html_to_text(&body)
    } else {
        body.into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_bytes(SourceKind::DocumentPdf, b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_bytes(SourceKind::DocumentDocx, b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_runs_and_paragraphs() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t xml:space=\"preserve\">Caching speeds </w:t></w:r><w:r><w:t>reads.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Eviction &amp; expiry.</w:t></w:r></w:p>",
        );
        let text = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Caching speeds reads.\nEviction & expiry.");
    }

    #[test]
    fn docx_missing_document_xml() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_docx(&buf).unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn plain_text_passes_through() {
        let content = extract_bytes(SourceKind::PlainText, b"Hello there.").unwrap();
        assert_eq!(content, SourceContent::Text("Hello there.".into()));
    }

    #[test]
    fn plain_text_rejects_invalid_utf8() {
        let err = extract_bytes(SourceKind::PastedText, &[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn html_drops_tags_and_scripts() {
        let html = r#"<html><head><style>body { color: red; }</style><title>Guide</title></head>
<body><h1>Caching</h1><p>Caches store <b>hot</b> data.</p>
<script>var x = "<p>hidden</p>";</script><p>Fish &amp; chips&nbsp;today.</p></body></html>"#;
        let text = html_to_text(html);
        assert_eq!(text, "Guide Caching Caches store hot data. Fish & chips today.");
    }

    #[test]
    fn html_plain_text_unchanged() {
        assert_eq!(html_to_text("just  some\ntext"), "just some text");
    }

    #[test]
    fn html_unterminated_tag_is_dropped() {
        assert_eq!(html_to_text("before <a href="), "before");
    }
}

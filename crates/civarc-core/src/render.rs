//! HTML pages for browsing the archive.
//!
//! Rendering is a pure function of stored data. [`BasicRenderer`] produces
//! plain, dependency-free markup; callers wanting richer pages supply their
//! own [`PageRenderer`].

use crate::archive::{ArchiveRecord, ArchiveStore, AssetKind};
use crate::error::Result;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Data available when rendering one model page.
#[derive(Debug, Clone, Copy)]
pub struct ModelPage<'a> {
    pub key: &'a str,
    pub record: &'a ArchiveRecord,
    /// Raw catalog version payload.
    pub version: Option<&'a Value>,
    /// Raw catalog model payload.
    pub model: Option<&'a Value>,
}

/// One row of the corpus index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: String,
    pub title: String,
    pub file_name: String,
    pub model_type: Option<String>,
    pub base_model: Option<String>,
    /// Preview path relative to the archive root.
    pub preview: Option<String>,
}

/// Turns archived data into HTML.
pub trait PageRenderer: Send + Sync {
    fn model_page(&self, page: &ModelPage<'_>) -> String;

    fn index_page(&self, entries: &[IndexEntry]) -> String;
}

/// Minimal built-in renderer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRenderer;

impl PageRenderer for BasicRenderer {
    fn model_page(&self, page: &ModelPage<'_>) -> String {
        let record = page.record;
        let title = model_title(page.model, &record.file_name);
        let mut body = String::new();

        let _ = writeln!(body, "<h1>{}</h1>", escape(&title));
        let _ = writeln!(body, "<table class=\"details\">");
        row(&mut body, "File", &record.file_name);
        if let Some(name) = page.version.and_then(|v| str_field(v, "name")) {
            row(&mut body, "Version", name);
        }
        if let Some(kind) = page.model.and_then(|m| str_field(m, "type")) {
            row(&mut body, "Type", kind);
        }
        if let Some(base) = page.version.and_then(|v| str_field(v, "baseModel")) {
            row(&mut body, "Base model", base);
        }
        if let Some(creator) = page
            .model
            .and_then(|m| m.get("creator"))
            .and_then(|c| str_field(c, "username"))
        {
            row(&mut body, "Creator", creator);
        }
        row(&mut body, "SHA-256", record.hash.as_str());
        if let Some(updated_at) = record.updated_at {
            row(&mut body, "Updated", &updated_at.to_rfc3339());
        }
        let _ = writeln!(body, "</table>");

        let _ = writeln!(
            body,
            "<p><a href=\"https://civitai.com/models/{}?modelVersionId={}\">View on Civitai</a></p>",
            record.model_id, record.version_id
        );

        let trained_words: Vec<&str> = page
            .version
            .and_then(|v| v.get("trainedWords"))
            .and_then(Value::as_array)
            .map(|words| words.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !trained_words.is_empty() {
            let _ = writeln!(body, "<h2>Trigger words</h2>\n<ul class=\"trigger-words\">");
            for word in trained_words {
                let _ = writeln!(body, "<li><code>{}</code></li>", escape(word));
            }
            let _ = writeln!(body, "</ul>");
        }

        if !record.assets.is_empty() {
            let _ = writeln!(body, "<h2>Previews</h2>\n<div class=\"gallery\">");
            for asset in &record.assets {
                let src = escape(&asset.filename);
                match asset.kind {
                    AssetKind::Video => {
                        let _ = writeln!(
                            body,
                            "<video controls muted loop src=\"{}\"></video>",
                            src
                        );
                    }
                    AssetKind::Image => {
                        let _ = writeln!(
                            body,
                            "<img src=\"{}\" alt=\"Preview {}\" loading=\"lazy\">",
                            src,
                            asset.ordinal + 1
                        );
                    }
                }
            }
            let _ = writeln!(body, "</div>");
        }

        if !record.metadata.is_empty() {
            let _ = writeln!(body, "<h2>Training metadata</h2>\n<table class=\"metadata\">");
            for (key, value) in &record.metadata {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                row(&mut body, key, &text);
            }
            let _ = writeln!(body, "</table>");
        }

        let _ = writeln!(body, "<p><a href=\"../index.html\">Back to index</a></p>");
        document(&title, &body)
    }

    fn index_page(&self, entries: &[IndexEntry]) -> String {
        let mut body = String::new();
        let _ = writeln!(body, "<h1>Model archive</h1>");
        let _ = writeln!(body, "<p>{} models</p>", entries.len());
        let _ = writeln!(body, "<ul class=\"models\">");
        for entry in entries {
            let _ = write!(
                body,
                "<li><a href=\"{key}/{key}.html\">",
                key = escape(&entry.key)
            );
            if let Some(ref preview) = entry.preview {
                let _ = write!(body, "<img src=\"{}\" alt=\"\" loading=\"lazy\">", escape(preview));
            }
            let _ = write!(body, "<span class=\"title\">{}</span>", escape(&entry.title));
            let tags: Vec<&str> = [entry.model_type.as_deref(), entry.base_model.as_deref()]
                .into_iter()
                .flatten()
                .collect();
            if !tags.is_empty() {
                let _ = write!(body, " <span class=\"tags\">{}</span>", escape(&tags.join(" · ")));
            }
            let _ = writeln!(body, "</a> <small>{}</small></li>", escape(&entry.file_name));
        }
        let _ = writeln!(body, "</ul>");
        document("Model archive", &body)
    }
}

/// Render and store the page for one bundle. Returns whether the file changed.
pub fn write_model_page(
    store: &ArchiveStore,
    renderer: &dyn PageRenderer,
    key: &str,
    record: &ArchiveRecord,
) -> Result<bool> {
    let version = store.load_version_payload(key)?;
    let model = store.load_model_payload(key)?;
    let html = renderer.model_page(&ModelPage {
        key,
        record,
        version: version.as_ref(),
        model: model.as_ref(),
    });
    store.write_page(key, &html)
}

/// Rebuild the corpus index from every complete bundle.
pub fn write_index(store: &ArchiveStore, renderer: &dyn PageRenderer) -> Result<bool> {
    let mut entries = Vec::new();
    for key in store.bundle_keys()? {
        let record = match store.load(&key) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                warn!("Leaving {} out of the index: {}", key, e);
                continue;
            }
        };
        let model = store.load_model_payload(&key).ok().flatten();
        let version = store.load_version_payload(&key).ok().flatten();

        entries.push(IndexEntry {
            title: model_title(model.as_ref(), &record.file_name),
            file_name: record.file_name.clone(),
            model_type: model.as_ref().and_then(|m| str_field(m, "type")).map(str::to_string),
            base_model: version
                .as_ref()
                .and_then(|v| str_field(v, "baseModel"))
                .map(str::to_string),
            preview: record
                .assets
                .iter()
                .find(|a| a.kind == AssetKind::Image)
                .map(|a| format!("{}/{}", key, a.filename)),
            key,
        });
    }

    let written = store.write_index(&renderer.index_page(&entries))?;
    debug!("Index lists {} models (rewritten: {})", entries.len(), written);
    Ok(written)
}

fn model_title(model: Option<&Value>, fallback: &str) -> String {
    model
        .and_then(|m| str_field(m, "name"))
        .unwrap_or(fallback)
        .to_string()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<tr><th>{}</th><td>{}</td></tr>",
        escape(label),
        escape(value)
    );
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape(title),
        body
    )
}

/// Escape text for HTML element and attribute content.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{AssetDescriptor, Bundle};
    use crate::model_files::ContentHash;
    use chrono::Utc;
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn record() -> ArchiveRecord {
        ArchiveRecord {
            hash: ContentHash::from_hex("ab"),
            file_name: "m.safetensors".into(),
            model_id: 7,
            version_id: 11,
            updated_at: None,
            assets: vec![AssetDescriptor {
                url: "https://i.test/1.mp4".into(),
                filename: "m_preview_0.mp4".into(),
                ordinal: 0,
                kind: AssetKind::Video,
            }],
            metadata: Map::new(),
            archived_at: Utc::now(),
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_model_page_contents() {
        let record = record();
        let version = json!({"name": "v1", "baseModel": "SDXL", "trainedWords": ["<tag>"]});
        let model = json!({"name": "Cool <Model>", "type": "LORA"});
        let html = BasicRenderer.model_page(&ModelPage {
            key: "m",
            record: &record,
            version: Some(&version),
            model: Some(&model),
        });

        assert!(html.contains("<title>Cool &lt;Model&gt;</title>"));
        assert!(html.contains("<code>&lt;tag&gt;</code>"));
        assert!(html.contains("<video controls muted loop src=\"m_preview_0.mp4\">"));
        assert!(html.contains("modelVersionId=11"));
    }

    #[test]
    fn test_index_skips_incomplete_bundles() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArchiveStore::new(temp_dir.path());
        store
            .save(
                "m",
                &Bundle {
                    record: record(),
                    version: json!({"baseModel": "SD 1.5"}),
                    model: Some(json!({"name": "Model M", "type": "Checkpoint"})),
                },
            )
            .unwrap();
        std::fs::create_dir_all(store.bundle_dir("partial")).unwrap();

        assert!(write_index(&store, &BasicRenderer).unwrap());
        let html = std::fs::read_to_string(store.index_path()).unwrap();
        assert!(html.contains("<p>1 models</p>"));
        assert!(html.contains("Model M"));
        assert!(html.contains("Checkpoint · SD 1.5"));
        assert!(!write_index(&store, &BasicRenderer).unwrap());
    }
}

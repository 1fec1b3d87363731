//! HTML templates for the web interface.

use super::history::ConversionRecord;
use super::SUGGESTED_MODELS;
use crate::config::{ConversionConfig, LlmServiceKind, OutputFormat};
use crate::html::html_escape;

/// Base HTML page. `content` is inserted unescaped.
pub fn base_template(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - pdfmark</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <header id="main-header">
        <nav>
            <a href="/" class="logo">pdfmark</a>
            <a href="/api/conversions">api</a>
        </nav>
    </header>
    <div id="alerts"></div>
    <main>
        <h1>{title}</h1>
        {content}
    </main>
    <script src="/static/app.js"></script>
</body>
</html>"#,
        title = html_escape(title),
        content = content,
    )
}

fn option(value: &str, label: &str, selected: bool) -> String {
    format!(
        r#"<option value="{}"{}>{}</option>"#,
        html_escape(value),
        if selected { " selected" } else { "" },
        html_escape(label)
    )
}

/// Upload form plus the recent-conversions table.
pub fn index_page(records: &[ConversionRecord], config: &ConversionConfig) -> String {
    let formats: String = [OutputFormat::Markdown, OutputFormat::Html, OutputFormat::Json]
        .iter()
        .map(|f| option(f.as_str(), f.as_str(), *f == config.output_format))
        .collect();

    let services: String = [LlmServiceKind::Ollama, LlmServiceKind::OpenAi]
        .iter()
        .map(|s| option(s.as_str(), s.as_str(), *s == config.llm_service))
        .collect();

    let mut models: Vec<&str> = SUGGESTED_MODELS.to_vec();
    if !models.contains(&config.ollama_model.as_str()) {
        models.insert(0, config.ollama_model.as_str());
    }
    let models: String = models
        .iter()
        .map(|m| option(m, m, *m == config.ollama_model))
        .collect();

    let form = format!(
        r#"<form action="/convert" method="post" enctype="multipart/form-data" class="upload-form">
    <label>PDF file <input type="file" name="file" accept=".pdf,application/pdf" required></label>
    <label>Output format <select name="output_format">{formats}</select></label>
    <fieldset>
        <legend>LLM refinement</legend>
        <input type="hidden" name="use_llm" value="false">
        <label><input type="checkbox" name="use_llm" value="true"{checked}> Refine pages with an LLM</label>
        <label>Service <select name="llm_service">{services}</select></label>
        <label>Ollama model <select name="ollama_model">{models}</select></label>
        <label>Ollama URL <input type="url" name="ollama_base_url" value="{url}"></label>
    </fieldset>
    <button type="submit">Convert</button>
</form>"#,
        formats = formats,
        checked = if config.use_llm { " checked" } else { "" },
        services = services,
        models = models,
        url = html_escape(&config.ollama_base_url),
    );

    let content = format!(
        "{}\n<h2>Recent conversions</h2>\n{}",
        form,
        history_table(records)
    );
    base_template("Convert a PDF", &content)
}

fn history_table(records: &[ConversionRecord]) -> String {
    if records.is_empty() {
        return r#"<p class="empty">No conversions yet.</p>"#.to_string();
    }

    let mut rows = String::new();
    for r in records {
        let id = html_escape(&r.id);
        rows.push_str(&format!(
            r#"<tr>
    <td><a href="/preview/{id}">{name}</a></td>
    <td><time datetime="{ts}">{when}</time></td>
    <td><a href="/download/{id}/md">document</a> · <a href="/download/{id}/meta">meta.json</a></td>
</tr>
"#,
            id = id,
            name = html_escape(&r.filename),
            ts = r.timestamp.to_rfc3339(),
            when = r.timestamp.format("%Y-%m-%d %H:%M UTC"),
        ));
    }

    format!(
        "<table class=\"history\">\n<thead><tr><th>File</th><th>Converted</th><th>Downloads</th></tr></thead>\n<tbody>\n{}</tbody>\n</table>",
        rows
    )
}

/// Result page for one conversion.
pub fn preview_page(record: &ConversionRecord, content: Option<&str>) -> String {
    let id = html_escape(&record.id);
    let body = match content {
        Some(text) => format!(r#"<pre class="markdown">{}</pre>"#, html_escape(text)),
        None => r#"<p class="empty">Inline preview is only available for Markdown output. Download the document instead.</p>"#
            .to_string(),
    };

    let content = format!(
        r#"<dl class="paths">
    <dt>Output folder</dt><dd><code>{dir}</code></dd>
    <dt>Document</dt><dd><code>{doc}</code></dd>
    <dt>Metadata</dt><dd><code>{meta}</code></dd>
</dl>
<p class="downloads">
    <a class="button" href="/download/{id}/md">Download document</a>
    <a class="button" href="/download/{id}/meta">Download meta.json</a>
</p>
{body}"#,
        dir = html_escape(&record.output_path.display().to_string()),
        doc = html_escape(&record.document_path.display().to_string()),
        meta = html_escape(&record.metadata_path().display().to_string()),
        id = id,
        body = body,
    );

    base_template(&record.filename, &content)
}

pub fn not_found_page() -> String {
    base_template(
        "Not found",
        r#"<p class="empty">Nothing here. <a href="/">Back to the upload form</a>.</p>"#,
    )
}

use regex::Regex;
use reqwest::Url;
use tracing::debug;

use super::http::{Http, url_with_segments};
use super::{FetchedDocs, FetchedFile, Source};
use crate::config::{Ecosystem, PackageEntry};
use crate::error::{FetchError, FetchErrorKind};

pub const DEFAULT_RUST_BASE: &str = "https://docs.rs";
pub const DEFAULT_NODE_BASE: &str = "https://www.jsdocs.io";

/// Latest-docs adapter: fetches the canonical rendered page for a package
/// version and normalizes it into a single `API.md` artifact.
#[derive(Clone, Debug)]
pub struct RenderedDocsSource {
    http: Http,
    ecosystem: Ecosystem,
    base_url: String,
}

impl RenderedDocsSource {
    pub fn new(http: Http, ecosystem: Ecosystem) -> Self {
        let base_url = match ecosystem {
            Ecosystem::Rust => DEFAULT_RUST_BASE.to_string(),
            Ecosystem::Node => DEFAULT_NODE_BASE.to_string(),
        };
        Self {
            http,
            ecosystem,
            base_url,
        }
    }

    pub fn with_base(http: Http, ecosystem: Ecosystem, base_url: impl Into<String>) -> Self {
        Self {
            http,
            ecosystem,
            base_url: base_url.into(),
        }
    }

    fn page_url(&self, name: &str, version: &str) -> Result<Url, FetchError> {
        match self.ecosystem {
            Ecosystem::Rust => url_with_segments(&self.base_url, &["crate", name, version]),
            Ecosystem::Node => {
                url_with_segments(&self.base_url, &["package", name, "v", version])
            }
        }
    }
}

impl Source for RenderedDocsSource {
    fn name(&self) -> &'static str {
        "rendered_docs"
    }

    fn fetch(&self, entry: &PackageEntry, version: &str) -> Result<FetchedDocs, FetchError> {
        let url = self.page_url(&entry.name, version)?;
        let html = self.http.get_text(url.as_str(), &[])?;
        let markdown = normalize_rendered_page(&html, &entry.name, version, url.as_str())?;

        debug!(name = %entry.name, version, url = %url, "normalized rendered docs page");
        Ok(FetchedDocs {
            files: vec![FetchedFile {
                original_path: "API.md".to_string(),
                bytes: markdown.into_bytes(),
            }],
            reference: url.to_string(),
            is_fallback: false,
        })
    }
}

/// Deterministic HTML-to-markdown normalization. The output always carries a
/// level-1 identity heading, an Overview section, an API Reference section,
/// and a provenance footer; when any mandatory piece cannot be produced the
/// result is degraded and must not count as a rendered-docs success.
pub fn normalize_rendered_page(
    html: &str,
    name: &str,
    version: &str,
    source_url: &str,
) -> Result<String, FetchError> {
    let main = extract_main_content(html);
    let cleaned = strip_chrome(&main);
    let absolute = rewrite_relative_links(&cleaned, source_url);
    let body = html_to_markdown(&absolute);

    let (overview, reference) = split_overview(&body);
    let has_code_block = body.contains("```");

    if overview.trim().is_empty() || reference.trim().is_empty() || !has_code_block {
        return Err(FetchError::new(
            FetchErrorKind::NormalizationDegraded,
            format!(
                "rendered page for {name}@{version} lost a mandatory section during normalization"
            ),
        ));
    }

    let mut out = String::new();
    out.push_str(&format!("# {name} {version}\n\n"));
    out.push_str("## Overview\n\n");
    out.push_str(overview.trim());
    out.push_str("\n\n## API Reference\n\n");
    out.push_str(reference.trim());
    out.push_str(&format!("\n\n---\n\nSource: {source_url}\n"));
    Ok(out)
}

fn extract_main_content(html: &str) -> String {
    for container in ["article", "main", "body"] {
        let pattern = format!(r"(?is)<{container}[^>]*>(.*?)</{container}>");
        let re = Regex::new(&pattern).expect("static pattern");
        if let Some(captures) = re.captures(html) {
            return captures[1].to_string();
        }
    }
    html.to_string()
}

fn strip_chrome(html: &str) -> String {
    let mut out = html.to_string();
    for container in ["script", "style", "nav", "header", "footer", "aside"] {
        let pattern = format!(r"(?is)<{container}[^>]*>.*?</{container}>");
        let re = Regex::new(&pattern).expect("static pattern");
        out = re.replace_all(&out, "").to_string();
    }
    out
}

fn rewrite_relative_links(html: &str, source_url: &str) -> String {
    let Ok(base) = Url::parse(source_url) else {
        return html.to_string();
    };
    let re = Regex::new(r#"(?i)(href|src)="([^"]+)""#).expect("static pattern");

    re.replace_all(html, |captures: &regex::Captures<'_>| {
        let attr = &captures[1];
        let target = &captures[2];
        if target.starts_with('#')
            || target.starts_with("http://")
            || target.starts_with("https://")
            || target.starts_with("mailto:")
        {
            return format!(r#"{attr}="{target}""#);
        }
        match base.join(target) {
            Ok(absolute) => format!(r#"{attr}="{absolute}""#),
            Err(_) => format!(r#"{attr}="{target}""#),
        }
    })
    .to_string()
}

fn html_to_markdown(html: &str) -> String {
    let mut out = html.to_string();

    // Fenced code first so nothing inside gets reinterpreted later.
    let pre_code = Regex::new(r"(?is)<pre[^>]*>\s*<code[^>]*>(.*?)</code>\s*</pre>")
        .expect("static pattern");
    out = pre_code
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            format!("\n```\n{}\n```\n", unescape_entities(captures[1].trim_matches('\n')))
        })
        .to_string();
    let pre = Regex::new(r"(?is)<pre[^>]*>(.*?)</pre>").expect("static pattern");
    out = pre
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            format!("\n```\n{}\n```\n", unescape_entities(captures[1].trim_matches('\n')))
        })
        .to_string();

    let heading = Regex::new(r"(?is)<h([1-6])[^>]*>(.*?)</h[1-6]>").expect("static pattern");
    out = heading
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            let level: usize = captures[1].parse().unwrap_or(1);
            format!("\n\n{} {}\n\n", "#".repeat(level), strip_tags(&captures[2]))
        })
        .to_string();

    let link = Regex::new(r#"(?is)<a[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).expect("static pattern");
    out = link
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            let text = strip_tags(&captures[2]);
            if text.is_empty() {
                String::new()
            } else {
                format!("[{}]({})", text, &captures[1])
            }
        })
        .to_string();

    let row = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("static pattern");
    let cell = Regex::new(r"(?is)<t[hd][^>]*>(.*?)</t[hd]>").expect("static pattern");
    out = row
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            let cells: Vec<String> = cell
                .captures_iter(&captures[1])
                .map(|cell| strip_tags(&cell[1]))
                .collect();
            if cells.is_empty() {
                String::new()
            } else {
                format!("\n| {} |\n", cells.join(" | "))
            }
        })
        .to_string();

    let item = Regex::new(r"(?is)<li[^>]*>(.*?)</li>").expect("static pattern");
    out = item
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            format!("\n- {}\n", strip_tags(&captures[1]))
        })
        .to_string();

    let inline_code = Regex::new(r"(?is)<code[^>]*>(.*?)</code>").expect("static pattern");
    out = inline_code
        .replace_all(&out, |captures: &regex::Captures<'_>| {
            format!("`{}`", unescape_entities(&captures[1]))
        })
        .to_string();

    let paragraph = Regex::new(r"(?i)</?p[^>]*>").expect("static pattern");
    out = paragraph.replace_all(&out, "\n\n").to_string();

    let tag = Regex::new(r"(?s)<[^>]+>").expect("static pattern");
    out = tag.replace_all(&out, "").to_string();

    out = unescape_entities(&out);

    let blank_runs = Regex::new(r"\n{3,}").expect("static pattern");
    blank_runs.replace_all(out.trim(), "\n\n").to_string()
}

/// Content before the page's first heading is the overview; the rest is the
/// reference body. Pages that open directly with a heading get their first
/// section as overview instead.
fn split_overview(body: &str) -> (String, String) {
    let mut first_heading = None;
    for (offset, line) in line_offsets(body) {
        if line.starts_with('#') {
            first_heading = Some(offset);
            break;
        }
    }

    match first_heading {
        Some(0) | None => {
            // No leading prose: carve the first section out as overview.
            let mut heading_count = 0;
            for (offset, line) in line_offsets(body) {
                if line.starts_with('#') {
                    heading_count += 1;
                    if heading_count == 2 {
                        let (head, tail) = body.split_at(offset);
                        return (strip_headings(head), tail.to_string());
                    }
                }
            }
            (strip_headings(body), String::new())
        }
        Some(offset) => {
            let (head, tail) = body.split_at(offset);
            (head.to_string(), tail.to_string())
        }
    }
}

fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().scan(0usize, |offset, line| {
        let current = *offset;
        *offset += line.len() + 1;
        Some((current, line))
    })
}

fn strip_headings(text: &str) -> String {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_tags(html: &str) -> String {
    let tag = Regex::new(r"(?s)<[^>]+>").expect("static pattern");
    unescape_entities(tag.replace_all(html, "").trim())
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

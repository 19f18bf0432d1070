use regex::Regex;

/// Appended when a changelog is cut down to its recent release series.
pub const CHANGELOG_TRIM_MARKER: &str = "[changelog trimmed by aifd: older releases omitted]";

/// Separator replacing `/` in persisted filenames.
pub const FLATTEN_DELIMITER: &str = "__";

const HEADER_PREFIX: &str = "<!-- Source:";

/// Everything a transform needs besides the bytes themselves. Transforms are
/// pure: identical context and input produce identical output.
#[derive(Clone, Debug)]
pub struct TransformContext {
    /// Human-readable origin: `owner/name`, `registry-archive`, or a URL.
    pub source: String,
    pub reference: String,
    pub is_fallback: bool,
    /// `YYYY-MM-DD`; recorded in injected headers.
    pub fetched_date: String,
    pub target_version: String,
    pub max_file_size_kb: u64,
}

#[derive(Clone, Debug)]
pub struct TransformedFile {
    pub file_name: String,
    pub original_path: String,
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

pub fn transform_file(ctx: &TransformContext, original_path: &str, bytes: Vec<u8>) -> TransformedFile {
    let file_name = flatten_filename(original_path);

    // Non-UTF-8 payloads are persisted as-is; only the name is flattened.
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            return TransformedFile {
                file_name,
                original_path: original_path.to_string(),
                bytes: err.into_bytes(),
                truncated: false,
            };
        }
    };

    // Re-running the pipeline must not grow the file: an already-injected
    // header is split off so the cap below sees only the payload.
    let (existing_header, payload) = split_existing_header(&text);

    let payload = if is_changelog_path(original_path) {
        trim_changelog(&payload, &ctx.target_version)
    } else {
        payload
    };

    let limit = ctx.max_file_size_kb * 1024;
    let (payload, truncated) = cap_size(&payload, limit, ctx.max_file_size_kb);

    let text = match existing_header {
        Some(header) => format!("{header}{payload}"),
        None if is_markup_path(original_path) => inject_header(&payload, ctx, original_path),
        None => payload,
    };

    TransformedFile {
        file_name,
        original_path: original_path.to_string(),
        bytes: text.into_bytes(),
        truncated,
    }
}

pub fn flatten_filename(path: &str) -> String {
    path.replace('\\', "/").replace('/', FLATTEN_DELIMITER)
}

pub fn is_changelog_path(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let stem = basename.split_once('.').map_or(basename, |(stem, _)| stem);
    matches!(
        stem.to_ascii_lowercase().as_str(),
        "changelog" | "changes" | "history"
    )
}

fn is_markup_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Keeps the target version's minor series plus the immediately previous
/// minor series; anything older is dropped and a stable marker appended.
/// Content with no recognizable version headings is left untouched.
pub fn trim_changelog(content: &str, target_version: &str) -> String {
    let Some(target) = parse_major_minor(target_version) else {
        return content.to_string();
    };

    let heading = heading_version_pattern();
    let mut headings: Vec<(usize, (u64, u64))> = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if let Some(captures) = heading.captures(line) {
            let major = captures[1].parse().unwrap_or(0);
            let minor = captures[2].parse().unwrap_or(0);
            headings.push((index, (major, minor)));
        }
    }

    if headings.is_empty() {
        return content.to_string();
    }

    // The series floor: the greatest minor strictly below the target's, or
    // the target's own when nothing older exists.
    let previous = headings
        .iter()
        .map(|(_, series)| *series)
        .filter(|series| *series < target)
        .max();
    let floor = previous.unwrap_or(target);

    let lines: Vec<&str> = content.lines().collect();
    let mut kept: Vec<&str> = Vec::new();
    let mut dropped_any = false;
    let mut keep_current = true;

    for (index, line) in lines.iter().enumerate() {
        if let Some(position) = headings.iter().position(|(at, _)| *at == index) {
            let (_, series) = headings[position];
            keep_current = series >= floor;
        }
        if keep_current {
            kept.push(line);
        } else {
            dropped_any = true;
        }
    }

    if !dropped_any {
        return content.to_string();
    }

    let mut out = kept.join("\n");
    while out.ends_with('\n') {
        out.pop();
    }
    out.push_str("\n\n");
    out.push_str(CHANGELOG_TRIM_MARKER);
    out.push('\n');
    out
}

fn heading_version_pattern() -> Regex {
    // `## [0.13.1] - 2024-01-01`, `# v1.2.3`, `### 1.2.3-rc.1`
    Regex::new(r"^#{1,3}\s.*?\[?v?(\d+)\.(\d+)\.(\d+)(?:-[0-9A-Za-z.]+)?\]?")
        .expect("static pattern")
}

fn parse_major_minor(version: &str) -> Option<(u64, u64)> {
    let core = version.split_once('-').map_or(version, |(core, _)| core);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Truncates oversized content at a safe boundary and appends the marker.
/// Content at or under the limit is returned untouched; the marker bytes are
/// never counted against the limit.
pub fn cap_size(content: &str, limit_bytes: u64, limit_kb: u64) -> (String, bool) {
    if content.len() as u64 <= limit_bytes {
        return (content.to_string(), false);
    }

    // Already-capped content carries the marker at the end; capping again
    // would eat into the kept text.
    let marker = format!("[TRUNCATED by aifd at {limit_kb}KB]");
    if content.trim_end().ends_with(&marker) {
        return (content.to_string(), true);
    }

    let cut = safe_cut_offset(content, limit_bytes as usize);
    let mut out = content[..cut].trim_end().to_string();
    out.push_str(&format!("\n\n[TRUNCATED by aifd at {limit_kb}KB]\n"));
    (out, true)
}

/// Largest offset not exceeding the limit that ends a paragraph or section
/// outside any fenced code block. Falls back to a line boundary, then to the
/// nearest fence opening.
fn safe_cut_offset(content: &str, limit: usize) -> usize {
    let mut in_fence = false;
    let mut offset = 0;
    let mut best_paragraph = 0;
    let mut best_line = 0;
    let mut last_fence_start = 0;

    for line in content.split_inclusive('\n') {
        let end = offset + line.len();
        if end > limit {
            break;
        }

        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            if !in_fence {
                last_fence_start = offset;
            }
            in_fence = !in_fence;
        }

        if !in_fence {
            best_line = end;
            if line.trim().is_empty() || trimmed.starts_with('#') {
                best_paragraph = end;
            }
        }

        offset = end;
    }

    if best_paragraph > 0 {
        best_paragraph
    } else if best_line > 0 {
        best_line
    } else {
        last_fence_start
    }
}

/// Splits an already-injected provenance header (the comment lines up to the
/// first blank line) from the payload.
fn split_existing_header(text: &str) -> (Option<String>, String) {
    if !text.starts_with(HEADER_PREFIX) {
        return (None, text.to_string());
    }
    match text.find("\n\n") {
        Some(end) => (
            Some(text[..end + 2].to_string()),
            text[end + 2..].to_string(),
        ),
        None => (Some(text.to_string()), String::new()),
    }
}

/// Prepends a provenance comment to markdown and HTML artifacts. A second
/// warning line marks default-branch fallbacks.
fn inject_header(content: &str, ctx: &TransformContext, original_path: &str) -> String {
    let mut header = format!(
        "<!-- Source: {} | Ref: {} | Path: {} | Fetched: {} -->\n",
        ctx.source, ctx.reference, original_path, ctx.fetched_date
    );
    if ctx.is_fallback {
        header.push_str(&format!(
            "<!-- Warning: no tag matched version {}; content is from branch '{}' and may differ -->\n",
            ctx.target_version, ctx.reference
        ));
    }
    header.push('\n');
    header.push_str(content);
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ctx(max_kb: u64) -> TransformContext {
        TransformContext {
            source: "lodash/lodash".to_string(),
            reference: "v4.17.21".to_string(),
            is_fallback: false,
            fetched_date: "2026-02-01".to_string(),
            target_version: "4.17.21".to_string(),
            max_file_size_kb: max_kb,
        }
    }

    #[test]
    fn changelog_keeps_current_and_previous_minor_series() {
        let changelog = "\
# Changelog

## [0.13.1]
fix things

## [0.13.0]
features

## [0.12.0]
older features

## [0.11.0]
ancient history
";
        let trimmed = trim_changelog(changelog, "0.13.1");
        assert!(trimmed.contains("0.13.1"));
        assert!(trimmed.contains("0.13.0"));
        assert!(trimmed.contains("0.12.0"));
        assert!(!trimmed.contains("0.11.0"));
        assert!(!trimmed.contains("ancient history"));
        assert!(trimmed.trim_end().ends_with(CHANGELOG_TRIM_MARKER));
    }

    #[test]
    fn changelog_without_headings_is_untouched() {
        let content = "just some prose about releases\n";
        assert_eq!(trim_changelog(content, "1.0.0"), content);
    }

    #[test]
    fn changelog_with_nothing_to_drop_is_untouched() {
        let content = "## v1.2.0\nrecent\n\n## v1.1.0\nprevious\n";
        assert_eq!(trim_changelog(content, "1.2.0"), content);
    }

    #[test]
    fn changelog_trim_is_idempotent() {
        let changelog = "## [2.1.0]\nnew\n\n## [2.0.0]\nbase\n\n## [1.9.0]\nold\n";
        let once = trim_changelog(changelog, "2.1.0");
        let twice = trim_changelog(&once, "2.1.0");
        assert_eq!(once, twice);
    }

    #[test]
    fn unparsable_target_version_keeps_content() {
        let content = "## [1.0.0]\nentry\n";
        assert_eq!(trim_changelog(content, "not-a-version"), content);
    }

    #[test]
    fn changelog_detection_is_case_insensitive() {
        assert!(is_changelog_path("CHANGELOG.md"));
        assert!(is_changelog_path("docs/changes.md"));
        assert!(is_changelog_path("History.md"));
        assert!(is_changelog_path("CHANGES"));
        assert!(!is_changelog_path("README.md"));
        assert!(!is_changelog_path("changelog-policy.md"));
    }

    #[test]
    fn exactly_at_limit_is_not_truncated() {
        let content = "a".repeat(1024);
        let (out, truncated) = cap_size(&content, 1024, 1);
        assert_eq!(out, content);
        assert!(!truncated);
    }

    #[test]
    fn one_byte_over_limit_is_truncated_with_marker() {
        let mut content = String::new();
        for i in 0..40 {
            content.push_str(&format!("paragraph number {i}\n\n"));
        }
        content.truncate(1025);

        let (out, truncated) = cap_size(&content, 1024, 1);
        assert!(truncated);
        assert!(out.contains("[TRUNCATED by aifd at 1KB]"));
        // The marker does not count against the limit.
        let kept = out.split("\n\n[TRUNCATED").next().expect("kept part");
        assert!(kept.len() <= 1024);
    }

    #[test]
    fn truncation_never_cuts_inside_a_fence() {
        let mut content = String::from("intro paragraph\n\n");
        content.push_str("```\n");
        for _ in 0..100 {
            content.push_str("let x = 1;\n");
        }
        content.push_str("```\n");

        let (out, truncated) = cap_size(&content, 64, 1);
        assert!(truncated);
        let kept = out.split("\n\n[TRUNCATED").next().expect("kept part");
        // Cut lands at the paragraph boundary before the fence opens.
        assert!(!kept.contains("```"));
    }

    #[test]
    fn header_is_injected_for_markdown() {
        let file = transform_file(&ctx(512), "README.md", b"# readme".to_vec());
        let text = String::from_utf8(file.bytes).expect("utf8");
        assert!(text.starts_with(
            "<!-- Source: lodash/lodash | Ref: v4.17.21 | Path: README.md | Fetched: 2026-02-01 -->\n"
        ));
        assert!(text.ends_with("# readme"));
    }

    #[test]
    fn fallback_adds_warning_line() {
        let mut fallback_ctx = ctx(512);
        fallback_ctx.is_fallback = true;
        fallback_ctx.reference = "main".to_string();

        let file = transform_file(&fallback_ctx, "README.md", b"content".to_vec());
        let text = String::from_utf8(file.bytes).expect("utf8");
        assert!(text.contains("<!-- Warning: no tag matched version 4.17.21"));
        assert!(text.contains("branch 'main'"));
    }

    #[test]
    fn plain_license_gets_no_header() {
        let file = transform_file(&ctx(512), "LICENSE", b"MIT License".to_vec());
        assert_eq!(file.bytes, b"MIT License");
    }

    #[test]
    fn filenames_flatten_with_double_delimiter() {
        assert_eq!(flatten_filename("docs/guide.md"), "docs__guide.md");
        assert_eq!(flatten_filename("a/b/c.md"), "a__b__c.md");
        assert_eq!(flatten_filename("README.md"), "README.md");
    }

    #[test]
    fn transform_is_idempotent() {
        let first = transform_file(&ctx(1), "CHANGELOG.md", make_changelog().into_bytes());
        let second = transform_file(&ctx(1), "CHANGELOG.md", first.bytes.clone());
        assert_eq!(first.bytes, second.bytes);
    }

    fn make_changelog() -> String {
        let mut content = String::from("# Changelog\n\n");
        for minor in (0..30).rev() {
            content.push_str(&format!("## [1.{minor}.0]\n"));
            for line in 0..20 {
                content.push_str(&format!("- change {line} in series 1.{minor}\n"));
            }
            content.push('\n');
        }
        content
    }

    proptest! {
        #[test]
        fn transform_twice_equals_transform_once(content in "[ -~\n]{0,2048}") {
            let context = ctx(1);
            let first = transform_file(&context, "README.md", content.clone().into_bytes());
            let second = transform_file(&context, "README.md", first.bytes.clone());
            prop_assert_eq!(first.bytes, second.bytes);
        }
    }
}

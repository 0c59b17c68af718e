//! Repository walking and light-weight markup scanning shared by analyzers.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use remedy_core::{CoreError, CoreResult, Issue};

use crate::error::AgentResult;

/// Directories never worth scanning.
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "dist",
    "build",
    ".git",
    ".next",
    "coverage",
    "vendor",
    "__pycache__",
];

/// Files larger than this are not read as source.
pub const MAX_SOURCE_BYTES: u64 = 1024 * 1024;

pub const SCRIPT_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];
pub const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "jsx", "tsx", "vue", "svelte"];

/// A text file read from the repository.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the repository root.
    pub relative: PathBuf,
    pub content: String,
}

impl SourceFile {
    pub fn extension(&self) -> &str {
        self.relative.extension().and_then(|e| e.to_str()).unwrap_or("")
    }

    pub fn file_name(&self) -> &str {
        self.relative.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }

    /// `(line number, text)` pairs, 1-based.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.content.lines().enumerate().map(|(i, l)| (i as u32 + 1, l))
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIP_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Every file under `root` accepted by `keep`, in sorted order.
///
/// Returns root-relative paths.
pub fn walk_files(root: &Path, keep: impl Fn(&Path) -> bool) -> AgentResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = remedy_core::fix::relative_to(root, entry.path());
        if keep(&relative) {
            files.push(relative);
        }
    }
    Ok(files)
}

/// Text files under `root` with one of `extensions`, in sorted order.
///
/// Oversized and non-UTF-8 files are skipped.
pub fn source_files(root: &Path, extensions: &[&str]) -> AgentResult<Vec<SourceFile>> {
    let paths = walk_files(root, |path| {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    })?;

    let mut files = Vec::with_capacity(paths.len());
    for relative in paths {
        let full = root.join(&relative);
        if std::fs::metadata(&full)?.len() > MAX_SOURCE_BYTES {
            continue;
        }
        let bytes = std::fs::read(&full)?;
        if let Ok(content) = String::from_utf8(bytes) {
            files.push(SourceFile { relative, content });
        }
    }
    Ok(files)
}

/// Whether the path looks like a test file.
pub fn is_test_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.contains(".test.")
        || name.contains(".spec.")
        || path
            .components()
            .any(|c| matches!(c.as_os_str().to_str(), Some("__tests__") | Some("tests") | Some("test")))
}

/// An opening markup tag found in source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// 1-based line of the `<`.
    pub line: u32,
    /// Byte offset of the `<` in the content.
    pub start: usize,
    /// Byte offset just past the closing `>`.
    pub end: usize,
    pub text: String,
}

impl Tag {
    pub fn has_attribute(&self, attribute: &str) -> bool {
        attribute_names(&self.text)
            .iter()
            .any(|name| name.eq_ignore_ascii_case(attribute))
    }
}

/// Every `<element ...>` opening tag in `content`, case-insensitive.
///
/// Tags may span lines. Quotes and JSX braces are honored when looking for
/// the closing `>`; an unterminated tag runs to the end of the content.
pub fn find_tags(content: &str, element: &str) -> Vec<Tag> {
    let bytes = content.as_bytes();
    let needle = element.as_bytes();
    let mut tags = Vec::new();
    let mut i = 0;
    // Line of `counted`; advanced incrementally so the scan stays linear.
    let mut line = 1u32;
    let mut counted = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' || !starts_with_ignore_case(&bytes[i + 1..], needle) {
            i += 1;
            continue;
        }
        let after = i + 1 + needle.len();
        let boundary = bytes.get(after).map(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/');
        if boundary != Some(true) {
            i += 1;
            continue;
        }

        let end = tag_end(bytes, after);
        line += bytes[counted..i].iter().filter(|&&b| b == b'\n').count() as u32;
        counted = i;
        tags.push(Tag {
            line,
            start: i,
            end,
            text: content[i..end].to_string(),
        });
        i = end;
    }
    tags
}

fn starts_with_ignore_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut braces = 0usize;
    for (offset, &b) in bytes[from..].iter().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' | b'`' => quote = Some(b),
                b'{' => braces += 1,
                b'}' => braces = braces.saturating_sub(1),
                b'>' if braces == 0 => return from + offset + 1,
                _ => {}
            },
        }
    }
    bytes.len()
}

/// Attribute names of an opening tag, in order.
pub fn attribute_names(tag: &str) -> Vec<String> {
    let bytes = tag.as_bytes();
    let mut names = Vec::new();
    // Skip `<element`.
    let mut i = 1;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' && bytes[i] != b'/' {
        i += 1;
    }

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() || b == b'/' {
            i += 1;
        } else if b == b'>' {
            break;
        } else if b == b'{' {
            // JSX spread such as `{...props}`.
            i = skip_balanced(bytes, i);
        } else {
            let start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && !matches!(bytes[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            names.push(tag[start..i].to_string());
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if bytes.get(i) == Some(&b'=') {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                i = skip_value(bytes, i);
            }
        }
    }
    names
}

fn skip_value(bytes: &[u8], i: usize) -> usize {
    match bytes.get(i) {
        Some(&q) if q == b'"' || q == b'\'' => bytes[i + 1..]
            .iter()
            .position(|&b| b == q)
            .map(|p| i + p + 2)
            .unwrap_or(bytes.len()),
        Some(b'{') => skip_balanced(bytes, i),
        _ => {
            let mut j = i;
            while j < bytes.len() && !bytes[j].is_ascii_whitespace() && bytes[j] != b'>' {
                j += 1;
            }
            j
        }
    }
}

fn skip_balanced(bytes: &[u8], i: usize) -> usize {
    let mut depth = 0usize;
    for (offset, &b) in bytes[i..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + offset + 1;
                }
            }
            _ => {}
        }
    }
    bytes.len()
}

/// Run a synchronous scan off the async runtime.
pub(crate) async fn blocking<T, F>(analyzer: &str, root: &Path, scan: F) -> CoreResult<T>
where
    F: FnOnce(&Path) -> T + Send + 'static,
    T: Send + 'static,
{
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&root))
        .await
        .map_err(|e| CoreError::AnalyzerFailed {
            analyzer: analyzer.to_string(),
            message: e.to_string(),
        })
}

/// Gathers a sub-check's issues, degrading a failed sub-check to an
/// `analysis_incomplete` marker.
pub(crate) fn gather(analyzer: &str, check: &str, result: AgentResult<Vec<Issue>>, issues: &mut Vec<Issue>) {
    match result {
        Ok(found) => issues.extend(found),
        Err(e) => {
            tracing::warn!("{} sub-check {} failed: {}", analyzer, check, e);
            issues.push(Issue::analysis_incomplete(analyzer, format!("{}: {}", check, e)));
        }
    }
}

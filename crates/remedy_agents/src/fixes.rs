//! Fix handlers for the descriptors produced by the built-in analyzers.
//!
//! Every handler edits text in place and keeps the file's line endings.
//! Targets are found by content, nearest to the line recorded at analysis,
//! because earlier fixes in the same file shift lines. A descriptor whose
//! target is gone is an error.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use remedy_core::{CoreError, CoreResult, FixDescriptor, FixHandler, FixWorkspace, Issue};

use crate::dependency::SECTIONS;
use crate::scan;

fn unexpected(handler: &str, fix: &FixDescriptor) -> CoreError {
    CoreError::fix_failed(handler, format!("cannot apply a {} fix", fix.kind()))
}

/// Byte range of every line, without its terminator.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for segment in content.split_inclusive('\n') {
        let body = segment.trim_end_matches('\n').trim_end_matches('\r');
        spans.push((start, start + body.len()));
        start += segment.len();
    }
    spans
}

/// The candidate line closest to `hint`.
///
/// Line numbers come from analysis and drift once an earlier fix in the same
/// file commits. Those fixes only remove lines, so ties go to the earlier line.
fn nearest(candidates: impl IntoIterator<Item = u32>, hint: u32) -> Option<u32> {
    candidates
        .into_iter()
        .min_by_key(|&line| (line.abs_diff(hint), line > hint))
}

fn log_drift(handler: &str, hint: u32, found: u32) {
    if hint != found {
        debug!("{}: target moved from line {} to {}", handler, hint, found);
    }
}

/// Adds `attribute="value"` to every `<element>` starting on the line that
/// lacks it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertAttributeFix;

impl InsertAttributeFix {
    const NAME: &'static str = "insert-attribute";

    fn rewrite(content: &str, line: u32, element: &str, attribute: &str, value: &str) -> CoreResult<String> {
        let missing: Vec<scan::Tag> = scan::find_tags(content, element)
            .into_iter()
            .filter(|tag| !tag.has_attribute(attribute))
            .collect();
        let target = nearest(missing.iter().map(|tag| tag.line), line).ok_or_else(|| {
            CoreError::fix_failed(
                Self::NAME,
                format!("no <{}> without {} near line {}", element, attribute, line),
            )
        })?;
        log_drift(Self::NAME, line, target);

        let insertion = format!(" {}=\"{}\"", attribute, value.replace('"', "&quot;"));
        let mut updated = content.to_string();
        // Back to front so earlier offsets stay valid.
        for tag in missing.iter().filter(|tag| tag.line == target).rev() {
            updated.insert_str(tag.start + 1 + element.len(), &insertion);
        }
        Ok(updated)
    }
}

#[async_trait]
impl FixHandler for InsertAttributeFix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, fix: &FixDescriptor) -> bool {
        matches!(fix, FixDescriptor::InsertAttribute { .. })
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, workspace: &mut FixWorkspace) -> CoreResult<()> {
        let FixDescriptor::InsertAttribute {
            file,
            line,
            element,
            attribute,
            value,
        } = fix
        else {
            return Err(unexpected(Self::NAME, fix));
        };
        let content = workspace.read_to_string(file)?;
        let updated = Self::rewrite(&content, *line, element, attribute, value)?;
        debug!("Adding {}=\"{}\" to <{}> in {}:{}", attribute, value, element, file.display(), line);
        workspace.write(file, updated)
    }
}

/// Deletes a line after checking it still holds the expected statement.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveLineFix;

impl RemoveLineFix {
    const NAME: &'static str = "remove-line";

    fn rewrite(content: &str, line: u32, expected: &str) -> CoreResult<String> {
        let wanted = expected.trim();
        let spans = line_spans(content);
        let matching = spans
            .iter()
            .enumerate()
            .filter(|(_, (start, end))| content[*start..*end].trim() == wanted)
            .map(|(i, _)| i as u32 + 1);
        let target = nearest(matching, line).ok_or_else(|| {
            CoreError::fix_failed(
                Self::NAME,
                format!("no line reads {:?} (expected near line {})", wanted, line),
            )
        })?;
        log_drift(Self::NAME, line, target);
        let (start, end) = spans[target as usize - 1];

        // Drop the terminator too, unless this is an unterminated last line.
        let rest = &content[end..];
        let terminator = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            0
        };
        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..start]);
        updated.push_str(&content[end + terminator..]);
        Ok(updated)
    }
}

#[async_trait]
impl FixHandler for RemoveLineFix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, fix: &FixDescriptor) -> bool {
        matches!(fix, FixDescriptor::RemoveLine { .. })
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, workspace: &mut FixWorkspace) -> CoreResult<()> {
        let FixDescriptor::RemoveLine { file, line, expected } = fix else {
            return Err(unexpected(Self::NAME, fix));
        };
        let content = workspace.read_to_string(file)?;
        let updated = Self::rewrite(&content, *line, expected)?;
        workspace.write(file, updated)
    }
}

/// Replaces the first occurrence of a literal, on one line or anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceTextFix;

impl ReplaceTextFix {
    const NAME: &'static str = "replace-text";

    fn rewrite(content: &str, line: Option<u32>, find: &str, replace: &str) -> CoreResult<String> {
        let (start, end) = match line {
            Some(line) => {
                let spans = line_spans(content);
                let containing = spans
                    .iter()
                    .enumerate()
                    .filter(|(_, (start, end))| content[*start..*end].contains(find))
                    .map(|(i, _)| i as u32 + 1);
                let target = nearest(containing, line).ok_or_else(|| {
                    CoreError::fix_failed(Self::NAME, format!("{:?} not found near line {}", find, line))
                })?;
                log_drift(Self::NAME, line, target);
                spans[target as usize - 1]
            }
            None => (0, content.len()),
        };
        let offset = content[start..end]
            .find(find)
            .ok_or_else(|| CoreError::fix_failed(Self::NAME, format!("{:?} not found", find)))?;
        let at = start + offset;

        let mut updated = String::with_capacity(content.len() + replace.len());
        updated.push_str(&content[..at]);
        updated.push_str(replace);
        updated.push_str(&content[at + find.len()..]);
        Ok(updated)
    }
}

#[async_trait]
impl FixHandler for ReplaceTextFix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, fix: &FixDescriptor) -> bool {
        matches!(fix, FixDescriptor::ReplaceText { .. })
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, workspace: &mut FixWorkspace) -> CoreResult<()> {
        let FixDescriptor::ReplaceText {
            file,
            line,
            find,
            replace,
        } = fix
        else {
            return Err(unexpected(Self::NAME, fix));
        };
        if find.is_empty() {
            return Err(CoreError::fix_failed(Self::NAME, "empty search text"));
        }
        let content = workspace.read_to_string(file)?;
        let updated = Self::rewrite(&content, *line, find, replace)?;
        workspace.write(file, updated)
    }
}

/// Pins a dependency to an exact version in a JSON manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinDependencyFix;

impl PinDependencyFix {
    const NAME: &'static str = "pin-dependency";

    /// Pin the package's entry in the first dependency section declaring it.
    /// Keys of the same name elsewhere (`peerDependencies`, `overrides`) are
    /// left alone.
    fn rewrite(manifest: &Path, content: &str, package: &str, version: &str) -> CoreResult<String> {
        let entry = Regex::new(&format!(r#"("{}"\s*:\s*")([^"]*)(")"#, regex::escape(package)))
            .map_err(|e| CoreError::fix_failed(Self::NAME, e.to_string()))?;
        let section = Regex::new(r#""([^"]+)"\s*:\s*\{"#).map_err(|e| CoreError::fix_failed(Self::NAME, e.to_string()))?;

        let target = entry.captures_iter(content).find(|caps| {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            section
                .captures_iter(&content[..start])
                .last()
                .map(|s| SECTIONS.contains(&&s[1]))
                .unwrap_or(false)
        });
        let Some(caps) = target else {
            return Err(CoreError::fix_failed(
                Self::NAME,
                format!("{} is not declared in {}", package, manifest.display()),
            ));
        };

        let (Some(whole), Some(value)) = (caps.get(0), caps.get(2)) else {
            return Err(CoreError::fix_failed(Self::NAME, "malformed dependency entry"));
        };
        debug!("Pinning {} at offset {} to {}", package, whole.start(), version);
        let mut updated = String::with_capacity(content.len() + version.len());
        updated.push_str(&content[..value.start()]);
        updated.push_str(version);
        updated.push_str(&content[value.end()..]);
        Ok(updated)
    }
}

#[async_trait]
impl FixHandler for PinDependencyFix {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, fix: &FixDescriptor) -> bool {
        matches!(fix, FixDescriptor::PinDependency { .. })
    }

    async fn apply(&self, _issue: &Issue, fix: &FixDescriptor, workspace: &mut FixWorkspace) -> CoreResult<()> {
        let FixDescriptor::PinDependency {
            manifest,
            package,
            version,
        } = fix
        else {
            return Err(unexpected(Self::NAME, fix));
        };
        let content = workspace.read_to_string(manifest)?;
        let updated = Self::rewrite(manifest, &content, package, version)?;
        workspace.write(manifest, updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use remedy_core::Severity;
    use tempfile::tempdir;

    #[test]
    fn test_insert_attribute_on_every_tag_of_the_line() {
        let content = "<p>\r\n<img src=\"a.png\"><IMG loading=\"eager\" src=\"b\"><img\n  src=\"c\">\r\n";
        let updated = InsertAttributeFix::rewrite(content, 2, "img", "loading", "lazy").unwrap();
        assert_eq!(
            updated,
            "<p>\r\n<img loading=\"lazy\" src=\"a.png\"><IMG loading=\"eager\" src=\"b\"><img loading=\"lazy\"\n  src=\"c\">\r\n"
        );
        assert!(InsertAttributeFix::rewrite(&updated, 2, "img", "loading", "lazy").is_err());
    }

    #[test]
    fn test_remove_line_keeps_other_endings() {
        let content = "a\r\nconsole.log(x);\r\nb";
        assert_eq!(RemoveLineFix::rewrite(content, 2, "console.log(x);").unwrap(), "a\r\nb");
        assert_eq!(RemoveLineFix::rewrite("a\nlast", 2, "last").unwrap(), "a\n");
        assert!(RemoveLineFix::rewrite(content, 2, "debugger;").is_err());
        assert!(RemoveLineFix::rewrite(content, 9, "x").is_err());
    }

    #[test]
    fn test_replace_text_scoped_to_line() {
        let content = "it.only('a');\nit.only('b');\n";
        assert_eq!(
            ReplaceTextFix::rewrite(content, Some(2), "it.only(", "it(").unwrap(),
            "it.only('a');\nit('b');\n"
        );
        assert!(ReplaceTextFix::rewrite(content, Some(2), "fit(", "it(").is_err());
    }

    #[test]
    fn test_targets_follow_removed_lines() {
        // Line 2 has already been removed, so line 5 now sits at line 4.
        let content = "const a = 1;\nconst b = 2;\nconst c = 3;\ndebugger;\nexport default a;\n";
        assert_eq!(
            RemoveLineFix::rewrite(content, 5, "debugger;").unwrap(),
            "const a = 1;\nconst b = 2;\nconst c = 3;\nexport default a;\n"
        );

        // Two identical statements: the one nearest the hint goes.
        let twice = "debugger;\nlet x;\ndebugger;\n";
        assert_eq!(RemoveLineFix::rewrite(twice, 3, "debugger;").unwrap(), "debugger;\nlet x;\n");

        let page = "<div>\n<img src=\"a.png\" alt=\"a\">\n</div>\n";
        assert_eq!(
            InsertAttributeFix::rewrite(page, 4, "img", "loading", "lazy").unwrap(),
            "<div>\n<img loading=\"lazy\" src=\"a.png\" alt=\"a\">\n</div>\n"
        );

        let spec = "describe('cart', () => {\n  it.only('adds', () => {});\n});\n";
        assert_eq!(
            ReplaceTextFix::rewrite(spec, Some(3), "it.only(", "it(").unwrap(),
            "describe('cart', () => {\n  it('adds', () => {});\n});\n"
        );
    }

    #[test]
    fn test_pin_dependency() {
        let content = "{\n  \"dependencies\": {\n    \"react\" : \"^18.2.0\",\n    \"react-dom\": \"^18.2.0\"\n  }\n}\n";
        let updated = PinDependencyFix::rewrite(Path::new("package.json"), content, "react", "18.2.0").unwrap();
        assert!(updated.contains("\"react\" : \"18.2.0\""));
        assert!(updated.contains("\"react-dom\": \"^18.2.0\""));
        assert!(PinDependencyFix::rewrite(Path::new("package.json"), content, "vue", "3.0.0").is_err());
    }

    #[test]
    fn test_pin_leaves_peer_ranges_alone() {
        let content = r#"{
  "peerDependencies": {
    "react": ">=17"
  },
  "dependencies": {
    "react": "^18.2.0"
  },
  "overrides": {
    "react": "^18.0.0"
  }
}
"#;
        let updated = PinDependencyFix::rewrite(Path::new("package.json"), content, "react", "18.2.0").unwrap();
        assert!(updated.contains("\"react\": \">=17\""));
        assert!(updated.contains("\"react\": \"18.2.0\""));
        assert!(updated.contains("\"react\": \"^18.0.0\""));
        assert_eq!(updated.matches("18.2.0").count(), 1);

        let peer_only = "{\n  \"peerDependencies\": {\n    \"react\": \">=17\"\n  }\n}\n";
        assert!(PinDependencyFix::rewrite(Path::new("package.json"), peer_only, "react", "18.2.0").is_err());
    }

    #[tokio::test]
    async fn test_handler_writes_through_workspace() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("page.html"), "<img src=\"a.png\">\n").unwrap();
        let fix = FixDescriptor::InsertAttribute {
            file: PathBuf::from("page.html"),
            line: 1,
            element: "img".to_string(),
            attribute: "loading".to_string(),
            value: "lazy".to_string(),
        };
        let issue = Issue::new("missing_lazy_loading", Severity::Low, "performance", "m").with_fix(fix.clone());
        let mut workspace = FixWorkspace::new(temp.path(), BTreeSet::from([PathBuf::from("page.html")]));

        assert!(InsertAttributeFix.supports(&fix));
        assert!(!RemoveLineFix.supports(&fix));
        InsertAttributeFix.apply(&issue, &fix, &mut workspace).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join("page.html")).unwrap(),
            "<img loading=\"lazy\" src=\"a.png\">\n"
        );
        assert!(RemoveLineFix.apply(&issue, &fix, &mut workspace).await.is_err());
    }
}

//! Sections of the generated Markdown document.
//!
//! The document is the architectural overview, then the annotated project
//! structure, then the contents of every selected file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use super::file_handler::FileHandler;
use super::posix_string;
use super::tree_generator::TreeGenerator;
use crate::utils::file_detection::language_identifier;

const ENTRY_POINTS: &[&str] = &[
    "main.py", "app.py", "run.py", "server.py", "index.js", "index.ts", "app.js", "app.ts",
    "main.rs",
];

/// Formats an integer with `,` thousands separators.
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn extension_in(path: &Path, set: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| set.contains(&ext))
}

fn file_name_is(path: &Path, names: &[&str]) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| names.contains(&name))
}

/// Whether a directory or the file stem is exactly one of `names`.
fn has_component(path: &Path, names: &[&str]) -> bool {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase());
    path.parent()
        .into_iter()
        .flat_map(Path::components)
        .map(|component| component.as_os_str().to_string_lossy().to_lowercase())
        .chain(stem)
        .any(|part| names.contains(&part.as_str()))
}

pub fn format_architectural_overview(files: &[PathBuf]) -> String {
    let count = |set: &[&str]| files.iter().filter(|f| extension_in(f, set)).count();
    let python = count(&["py"]);
    let javascript = count(&["js", "ts", "jsx", "tsx"]);
    let rust = count(&["rs"]);
    let config = count(&["json", "yaml", "yml", "toml", "ini", "cfg"]);
    let docs = count(&["md", "rst", "txt"]);

    let mut lines = vec![
        "Architectural Overview:".to_string(),
        "======================".to_string(),
    ];

    let any_named = |names: &[&str]| files.iter().any(|f| file_name_is(f, names));
    let mut technologies = Vec::new();
    if python > 0 {
        technologies.push("Python");
    }
    if javascript > 0 {
        technologies.push("JavaScript/TypeScript");
    }
    if rust > 0 {
        technologies.push("Rust");
    }
    if any_named(&["requirements.txt", "pyproject.toml"]) {
        technologies.push("pip/Poetry");
    }
    if any_named(&["package.json"]) {
        technologies.push("npm/Node.js");
    }
    if any_named(&["Cargo.toml"]) {
        technologies.push("Cargo");
    }
    if files.iter().any(|f| posix_string(f).to_lowercase().contains("dockerfile")) {
        technologies.push("Docker");
    }
    if !technologies.is_empty() {
        lines.push(format!("🛠️  Primary Technologies: {}", technologies.join(", ")));
    }

    lines.push(String::new());
    lines.push("📁 Project Components:".to_string());
    for (label, n) in [
        ("Python modules", python),
        ("JavaScript/TypeScript", javascript),
        ("Rust modules", rust),
        ("Configuration files", config),
        ("Documentation", docs),
    ] {
        if n > 0 {
            lines.push(format!("   • {label}: {n} files"));
        }
    }

    lines.push(String::new());
    lines.push("🏗️  Architecture Characteristics:".to_string());
    let has_ui = files.iter().any(|f| has_component(f, &["ui", "frontend", "web"]));
    let has_api = files.iter().any(|f| has_component(f, &["api", "server", "backend"]));
    let has_tests = files
        .iter()
        .any(|f| posix_string(f).to_lowercase().contains("test"));
    lines.push(
        match (has_ui, has_api) {
            (true, true) => "   • Full-stack application (UI + API)",
            (true, false) => "   • Frontend/UI focused application",
            (false, true) => "   • Backend/API focused application",
            (false, false) => "   • Library or utility project",
        }
        .to_string(),
    );
    if has_tests {
        lines.push("   • Includes test suite".to_string());
    }
    if docs > 0 {
        lines.push("   • Well-documented codebase".to_string());
    }

    let entry_points: Vec<&PathBuf> = files
        .iter()
        .filter(|f| file_name_is(f, ENTRY_POINTS))
        .collect();
    if !entry_points.is_empty() {
        lines.push(String::new());
        lines.push("🚀 Entry Points:".to_string());
        lines.extend(entry_points.iter().map(|f| format!("   • {}", posix_string(f))));
    }

    lines.push(String::new());
    lines.join("\n")
}

pub fn format_project_structure(
    root_label: &str,
    files: &[PathBuf],
    selected: &[PathBuf],
    tokens: &BTreeMap<PathBuf, usize>,
) -> String {
    let mut lines = vec![
        "Enhanced Project Structure:".to_string(),
        "=============================".to_string(),
    ];
    if files.is_empty() {
        lines.push("(No relevant files found)".to_string());
        return lines.join("\n") + "\n";
    }

    let selected_set: HashSet<PathBuf> = selected.iter().cloned().collect();
    let token_of = |path: &PathBuf| tokens.get(path).copied().unwrap_or(0);
    let total_tokens: usize = files.iter().map(token_of).sum();
    let selected_tokens: usize = files
        .iter()
        .filter(|f| selected_set.contains(*f))
        .map(token_of)
        .sum();

    let tree = TreeGenerator::generate_tree(root_label, files, tokens, &selected_set);
    lines.extend(tree.lines().map(str::to_string));

    lines.push(String::new());
    lines.push("📊 Summary:".to_string());
    lines.push(format!("   Total Files: {}", files.len()));
    lines.push(format!("   Selected for Content: {}", selected.len()));
    lines.push(format!("   Total Estimated Tokens: {}", format_count(total_tokens)));
    lines.push(format!("   Selected Files Tokens: {}", format_count(selected_tokens)));
    lines.push(String::new());
    lines.join("\n")
}

/// Renders one file as a header plus a language-tagged fenced block.
///
/// An unreadable file becomes a placeholder block instead of being dropped.
pub fn format_file_content(root: &Path, relative: &Path) -> String {
    let header = format!("--- File: {} ---", posix_string(relative));
    let absolute = root.join(relative);
    match FileHandler::read_file_content(&absolute) {
        Ok(decoded) => {
            let language = language_identifier(&absolute);
            let mut block = format!("{header}\n```{language}\n{}\n```", decoded.text);
            if decoded.used_fallback() {
                block.push_str(&format!(
                    "\n<!-- encoding fallback: {} -->",
                    decoded.encoding.label()
                ));
            }
            block.push('\n');
            block
        }
        Err(e) => {
            tracing::warn!("Skipping file due to read error: {}", e);
            format!("{header}\n```\n[Error reading file content]\n```\n")
        }
    }
}

/// Assembles the full document.
pub fn format_output(
    root: &Path,
    files: &[PathBuf],
    selected: &[PathBuf],
    tokens: &BTreeMap<PathBuf, usize>,
) -> String {
    let root_label = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());

    let mut parts = vec![
        format_architectural_overview(files),
        format_project_structure(&root_label, files, selected, tokens),
        "File Contents:".to_string(),
        "==============".to_string(),
    ];
    if selected.is_empty() {
        parts.push("(No relevant files to display content for)".to_string());
    } else {
        parts.extend(selected.iter().map(|relative| format_file_content(root, relative)));
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tracing_test::traced_test;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
    }

    #[test]
    fn test_overview_detects_stack_and_entry_points() {
        let files = paths(&[
            "app/main.py",
            "app/api/routes.py",
            "web/index.ts",
            "tests/test_routes.py",
            "requirements.txt",
            "README.md",
            "Dockerfile",
        ]);
        let overview = format_architectural_overview(&files);

        assert!(overview.starts_with("Architectural Overview:\n======================\n"));
        assert!(overview.contains(
            "Primary Technologies: Python, JavaScript/TypeScript, pip/Poetry, Docker"
        ));
        assert!(overview.contains("   • Python modules: 3 files"));
        assert!(overview.contains("   • Documentation: 2 files"));
        assert!(overview.contains("   • Full-stack application (UI + API)"));
        assert!(overview.contains("   • Includes test suite"));
        assert!(overview.contains("🚀 Entry Points:\n   • app/main.py\n   • web/index.ts"));
    }

    #[test]
    fn test_overview_matches_components_not_substrings() {
        // "build" contains "ui" and "rapid" contains "api", neither is a component.
        let overview =
            format_architectural_overview(&paths(&["build/lib.rs", "rapid.rs", "Cargo.toml"]));
        assert!(overview.contains("Rust, Cargo"));
        assert!(overview.contains("   • Library or utility project"));

        let overview = format_architectural_overview(&paths(&["src/ui/view.rs"]));
        assert!(overview.contains("   • Frontend/UI focused application"));
    }

    #[test]
    fn test_project_structure_summary() {
        let files = paths(&["a.py", "b.py"]);
        let tokens: BTreeMap<PathBuf, usize> =
            [(PathBuf::from("a.py"), 1500), (PathBuf::from("b.py"), 20)].into_iter().collect();
        let structure = format_project_structure("proj", &files, &paths(&["a.py"]), &tokens);

        assert!(structure
            .contains("proj/\n├── ✓ 🐍 a.py (1,500 tokens)\n└──   🐍 b.py (20 tokens)"));
        assert!(structure.contains("   Total Files: 2\n   Selected for Content: 1"));
        assert!(structure.contains("   Total Estimated Tokens: 1,520"));
        assert!(structure.contains("   Selected Files Tokens: 1,500"));
    }

    #[test]
    fn test_project_structure_without_files() {
        let structure = format_project_structure("proj", &[], &[], &BTreeMap::new());
        assert!(structure.ends_with("(No relevant files found)\n"));
    }

    #[test]
    fn test_file_content_block() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "print('hi')").unwrap();

        let block = format_file_content(dir.path(), Path::new("pkg/a.py"));
        assert_eq!(block, "--- File: pkg/a.py ---\n```python\nprint('hi')\n```\n");
    }

    #[test]
    fn test_latin1_fallback_is_marked() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.txt"), b"caf\xE9").unwrap();

        let block = format_file_content(dir.path(), Path::new("old.txt"));
        assert!(block.starts_with("--- File: old.txt ---\n```\ncaf\u{e9}\n```"));
        assert!(block.ends_with("\n<!-- encoding fallback: latin-1 -->\n"));
    }

    #[test]
    #[traced_test]
    fn test_unreadable_file_becomes_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let block = format_file_content(dir.path(), Path::new("gone.rs"));
        assert_eq!(block, "--- File: gone.rs ---\n```\n[Error reading file content]\n```\n");
        assert!(logs_contain("Skipping file due to read error"));
    }

    #[test]
    fn test_output_section_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\n").unwrap();
        let files = paths(&["a.py"]);

        let doc = format_output(dir.path(), &files, &files, &BTreeMap::new());
        let overview = doc.find("Architectural Overview:").unwrap();
        let structure = doc.find("Enhanced Project Structure:").unwrap();
        let contents = doc.find("File Contents:\n==============\n--- File: a.py ---").unwrap();
        assert!(overview < structure && structure < contents);

        let empty = format_output(dir.path(), &files, &[], &BTreeMap::new());
        assert!(empty.ends_with("==============\n(No relevant files to display content for)"));
    }
}

//! Renders the annotated project tree of the generated document.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::formatter::format_count;

const FILE_ICONS: &[(&str, &[&str])] = &[
    ("🐍", &["py", "pyw"]),
    ("⚡", &["js", "ts", "jsx", "tsx", "sh", "bat", "ps1"]),
    ("🦀", &["rs"]),
    ("🌐", &["html", "htm"]),
    ("🎨", &["css", "scss", "sass"]),
    ("⚙️", &["json", "yaml", "yml", "toml"]),
    ("📝", &["md", "rst", "txt"]),
    ("🗄️", &["sql"]),
    ("🐳", &["dockerfile", "dockerignore"]),
];

fn file_icon(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower == "dockerfile" || lower == "docker-compose.yml" {
        return "🐳";
    }
    let extension = Path::new(&lower)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_owned();
    FILE_ICONS
        .iter()
        .find(|(_, extensions)| extensions.contains(&extension.as_str()))
        .map(|(icon, _)| *icon)
        .unwrap_or("📄")
}

/// Generates the directory tree from a flat list of relative file paths.
///
/// Directories are derived from the file paths. Selected files carry a check
/// mark and every file with a non-zero estimate shows its token count.
pub struct TreeGenerator;

impl TreeGenerator {
    pub fn generate_tree(
        root_label: &str,
        files: &[PathBuf],
        tokens: &BTreeMap<PathBuf, usize>,
        selected: &HashSet<PathBuf>,
    ) -> String {
        let mut tree_map = HashMap::new();
        let mut roots = Vec::new();

        for file in files {
            Self::insert_into_tree(&mut tree_map, &mut roots, file);
        }

        let mut result = format!("{root_label}/\n");
        Self::render_children(&tree_map, &roots, tokens, selected, &mut result, "");
        result
    }

    /// Inserts a file path and all of its parent directories.
    fn insert_into_tree(
        tree_map: &mut HashMap<PathBuf, TreeNode>,
        roots: &mut Vec<PathBuf>,
        path: &Path,
    ) {
        let mut current_path = PathBuf::new();
        let components: Vec<_> = path.components().collect();

        for (index, component) in components.iter().enumerate() {
            let parent_path = current_path.clone();
            current_path.push(component);
            if tree_map.contains_key(&current_path) {
                continue;
            }

            tree_map.insert(
                current_path.clone(),
                TreeNode {
                    name: component.as_os_str().to_string_lossy().to_string(),
                    is_directory: index + 1 < components.len(),
                    children: Vec::new(),
                },
            );

            if index == 0 {
                roots.push(current_path.clone());
            } else if let Some(parent) = tree_map.get_mut(&parent_path) {
                parent.children.push(current_path.clone());
            }
        }
    }

    fn render_children(
        tree_map: &HashMap<PathBuf, TreeNode>,
        children: &[PathBuf],
        tokens: &BTreeMap<PathBuf, usize>,
        selected: &HashSet<PathBuf>,
        result: &mut String,
        prefix: &str,
    ) {
        let mut sorted_children: Vec<&PathBuf> = children.iter().collect();
        sorted_children.sort_by(|a, b| {
            let a_node = &tree_map[*a];
            let b_node = &tree_map[*b];

            // Directories first, then by name
            match (a_node.is_directory, b_node.is_directory) {
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                _ => a_node.name.cmp(&b_node.name),
            }
        });

        for (i, path) in sorted_children.iter().enumerate() {
            let node = &tree_map[*path];
            let is_last = i == sorted_children.len() - 1;
            let connector = if is_last { "└── " } else { "├── " };

            if !node.is_directory {
                let status = if selected.contains(*path) { "✓ " } else { "  " };
                let icon = file_icon(&node.name);
                let count = tokens.get(*path).copied().unwrap_or(0);
                let tokens_str = if count > 0 {
                    format!("({} tokens)", format_count(count))
                } else {
                    String::new()
                };
                let line = format!("{prefix}{connector}{status}{icon} {} {tokens_str}", node.name);
                result.push_str(line.trim_end());
                result.push('\n');
                continue;
            }

            result.push_str(&format!("{prefix}{connector}📁 {}/\n", node.name));
            let new_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };
            Self::render_children(tree_map, &node.children, tokens, selected, result, &new_prefix);
        }
    }
}

/// A transient node used for building the tree.
#[derive(Debug, Clone)]
struct TreeNode {
    name: String,
    is_directory: bool,
    children: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_tree_with_tokens_and_selection() {
        let files = paths(&["src/main.rs", "README.md", "src/util/helpers.py", "Cargo.toml"]);
        let tokens: BTreeMap<PathBuf, usize> = [
            (PathBuf::from("src/main.rs"), 1234),
            (PathBuf::from("README.md"), 12),
            (PathBuf::from("src/util/helpers.py"), 0),
            (PathBuf::from("Cargo.toml"), 40),
        ]
        .into_iter()
        .collect();
        let selected: HashSet<PathBuf> =
            paths(&["src/main.rs", "Cargo.toml"]).into_iter().collect();

        let tree = TreeGenerator::generate_tree("project", &files, &tokens, &selected);

        insta::assert_snapshot!(tree.trim_end(), @r"
        project/
        ├── 📁 src/
        │   ├── 📁 util/
        │   │   └──   🐍 helpers.py
        │   └── ✓ 🦀 main.rs (1,234 tokens)
        ├── ✓ ⚙️ Cargo.toml (40 tokens)
        └──   📝 README.md (12 tokens)");
    }

    #[test]
    fn test_shared_directories_are_rendered_once() {
        let files = paths(&["a/x.txt", "a/y.txt"]);
        let tree = TreeGenerator::generate_tree("root", &files, &BTreeMap::new(), &HashSet::new());
        assert_eq!(tree.matches("📁 a/").count(), 1);
        assert!(tree.contains("├──   📝 x.txt\n"));
        assert!(tree.ends_with("└──   📝 y.txt\n"));
    }

    #[test]
    fn test_empty_file_list_renders_root_only() {
        let tree = TreeGenerator::generate_tree("root", &[], &BTreeMap::new(), &HashSet::new());
        assert_eq!(tree, "root/\n");
    }

    #[test]
    fn test_file_icons() {
        assert_eq!(file_icon("Dockerfile"), "🐳");
        assert_eq!(file_icon("app.PY"), "🐍");
        assert_eq!(file_icon("LICENSE"), "📄");
    }
}

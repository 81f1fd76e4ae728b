use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use sync_harness_core::cursor::{Cursor, CursorMode};
use sync_harness_core::models::{Node, RawItem};

use crate::adapter::SourceAdapter;
use crate::config::NotesSourceConfig;

/// A directory of Markdown/plain-text notes.
///
/// Each file becomes one `document` node. `[[Other Note]]` links become
/// `links_to` edges pointing at the node the linked file would produce,
/// whether or not that file exists yet.
pub struct NotesAdapter {
    name: String,
    root: PathBuf,
    follow_symlinks: bool,
    include: GlobSet,
    exclude: GlobSet,
    link_pattern: Regex,
}

impl NotesAdapter {
    pub fn new(name: String, config: NotesSourceConfig) -> Result<Self> {
        let include = build_globset(&config.include_globs)?;

        let mut excludes = vec!["**/.git/**".to_string(), "**/.obsidian/**".to_string()];
        excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&excludes)?;

        let link_pattern = Regex::new(r"\[\[([^\]|#]+)(?:#[^\]|]*)?(?:\|([^\]]+))?\]\]")?;

        Ok(Self {
            name,
            root: config.root,
            follow_symlinks: config.follow_symlinks,
            include,
            exclude,
            link_pattern,
        })
    }

    fn node_id(&self, relative_path: &str) -> String {
        format!("{}:{}", self.source_label(), relative_path)
    }

    fn scan(&self) -> Result<Vec<RawItem>> {
        if !self.root.exists() {
            bail!("notes root does not exist: {}", self.root.display());
        }

        let mut items = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(self.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            items.push(read_note(path, &rel_str)?);
        }

        items.sort_by(|a, b| a.item_ref.cmp(&b.item_ref));
        Ok(items)
    }

    fn link_target(&self, raw: &str) -> String {
        let target = raw.trim();
        if Path::new(target).extension().is_some() {
            target.to_string()
        } else {
            format!("{}.md", target)
        }
    }
}

/// Stat one note. The body is read later, in `transform`, so an
/// unreadable file fails only its own item.
fn read_note(path: &Path, relative_path: &str) -> Result<RawItem> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("stat note {}", path.display()))?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    let modified_at: DateTime<Utc> = Utc
        .timestamp_opt(modified.as_secs() as i64, modified.subsec_nanos())
        .single()
        .unwrap_or_default();

    Ok(RawItem::new(relative_path, json!({ "path": relative_path })).updated(modified_at))
}

/// First Markdown H1, else the file stem.
fn note_title(relative_path: &str, body: &str) -> String {
    body.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| {
            Path::new(relative_path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| relative_path.to_string())
        })
}

#[async_trait]
impl SourceAdapter for NotesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "notes"
    }

    fn cursor_mode(&self) -> CursorMode {
        CursorMode::PerItem
    }

    async fn fetch_delta(&self, cursor: &Cursor) -> Result<Vec<RawItem>> {
        let mut items = self.scan()?;
        items.retain(|item| !cursor.has_seen(item));
        Ok(items)
    }

    async fn transform(&self, item: &RawItem) -> Result<Vec<Node>> {
        let path = item
            .payload
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("note payload missing path"))?;
        let full_path = self.root.join(path);
        let body = tokio::fs::read_to_string(&full_path)
            .await
            .with_context(|| format!("reading note {}", full_path.display()))?;
        let body = body.as_str();

        if body.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut node = Node::new(self.node_id(path), "document")
            .with_attribute("path", path)
            .with_attribute("title", note_title(path, body))
            .with_text(body);
        if let Some(modified_at) = item.updated_at {
            node = node.with_attribute("modified_at", modified_at.to_rfc3339());
        }

        let mut linked = Vec::new();
        for caps in self.link_pattern.captures_iter(body) {
            let target = self.link_target(&caps[1]);
            if linked.contains(&target) {
                continue;
            }
            linked.push(target);
        }
        for target in linked {
            node = node.with_edge(self.node_id(&target), "links_to");
        }

        Ok(vec![node])
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn adapter(root: &Path) -> NotesAdapter {
        NotesAdapter::new(
            "docs".to_string(),
            NotesSourceConfig {
                owner: "alice".to_string(),
                root: root.to_path_buf(),
                include_globs: vec!["**/*.md".to_string()],
                exclude_globs: vec!["drafts/**".to_string()],
                follow_symlinks: false,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetch_filters_globs_and_seen_items() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("a.md"), "# Alpha\nbody").unwrap();
        fs::write(dir.path().join("b.txt"), "ignored").unwrap();
        fs::write(dir.path().join("drafts/c.md"), "excluded").unwrap();

        let notes = adapter(dir.path());
        let cursor = Cursor::new("notes:docs", "alice");
        let items = notes.fetch_delta(&cursor).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_ref, "a.md");

        let seen = cursor.advanced(CursorMode::PerItem, &[&items[0]], &[]);
        assert!(notes.fetch_delta(&seen).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let notes = adapter(&dir.path().join("nope"));
        assert!(notes
            .fetch_delta(&Cursor::new("notes:docs", "alice"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn transform_builds_document_with_links() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("projects")).unwrap();
        fs::write(
            dir.path().join("projects/plan.md"),
            "# Launch plan\nSee [[Roadmap]] and [[people/Bob|Bob]]. Again [[Roadmap]].",
        )
        .unwrap();
        let notes = adapter(dir.path());
        let item = RawItem::new("projects/plan.md", json!({ "path": "projects/plan.md" }));

        let nodes = notes.transform(&item).await.unwrap();
        assert_eq!(nodes.len(), 1);
        let node = &nodes[0];
        assert_eq!(node.id, "notes:docs:projects/plan.md");
        assert_eq!(node.attributes["title"], "Launch plan");
        let targets: Vec<&str> = node.edges.iter().map(|e| e.to_id.as_str()).collect();
        assert_eq!(
            targets,
            vec!["notes:docs:Roadmap.md", "notes:docs:people/Bob.md"]
        );
        assert!(node.edges.iter().all(|e| e.relation_type == "links_to"));
    }

    #[tokio::test]
    async fn blank_note_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("empty.md"), "  \n").unwrap();
        let notes = adapter(dir.path());
        let item = RawItem::new("empty.md", json!({ "path": "empty.md" }));
        assert!(notes.transform(&item).await.unwrap().is_empty());
        assert_eq!(note_title("dir/idea.md", "no heading"), "idea");
    }

    #[tokio::test]
    async fn undecodable_note_fails_only_its_item() {
        use crate::adapter::RegisteredSource;
        use crate::dedup::StoreSet;
        use crate::engine::{EngineSettings, SyncEngine};
        use std::sync::Arc;
        use sync_harness_core::store::memory::{
            InMemoryCursorStore, InMemoryGraphStore, InMemoryVectorStore,
        };

        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("good.md"),
            "# Good\nRelease checklist: tag the build, publish notes, announce in the team channel.",
        )
        .unwrap();
        fs::write(dir.path().join("bad.md"), [0xffu8, 0xfe, 0x00, 0x41]).unwrap();

        let notes = Arc::new(adapter(dir.path()));
        let items = notes
            .fetch_delta(&Cursor::new("notes:docs", "alice"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);

        let bad = items.iter().find(|i| i.item_ref == "bad.md").unwrap();
        let err = notes.transform(bad).await.unwrap_err();
        assert!(format!("{:#}", err).contains("bad.md"));

        let graph = Arc::new(InMemoryGraphStore::new());
        let engine = SyncEngine::new(
            RegisteredSource {
                owner: "alice".to_string(),
                adapter: notes,
            },
            StoreSet::new(graph.clone(), Arc::new(InMemoryVectorStore::new())),
            Arc::new(InMemoryCursorStore::new()),
            EngineSettings::default(),
        );
        let result = engine.run_cycle().await.unwrap();
        assert_eq!(result.stats.created, 1);
        assert_eq!(result.stats.errors, 1);
        assert_eq!(result.stats.failures[0].item_ref, "bad.md");
        assert!(graph.get("notes:docs:good.md").is_some());
    }
}

//! Plan files: naming and storage

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::patterns::PatternSet;

/// Longest slug used for a file name, before the extension
const MAX_SLUG_CHARS: usize = 60;

/// Longest first line accepted as a name by [`extract_name_from_content`]
const MAX_NAME_LINE_CHARS: usize = 80;

/// How many numbered variants `create_plan_file` tries before giving up
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Destination for plan documents
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Create a new plan file and return its file name. Never overwrites an
    /// existing file.
    async fn create_plan_file(&self, project_path: &Path, name: &str, content: &str)
    -> Result<String>;

    /// Replace the content of a file created earlier
    async fn update_plan_file(&self, project_path: &Path, file_name: &str, content: &str)
    -> Result<()>;
}

/// Writes plans as Markdown files under `<project>/<plans_dir>/`
#[derive(Debug, Clone)]
pub struct FsPlanStore {
    plans_dir: PathBuf,
}

impl Default for FsPlanStore {
    fn default() -> Self {
        Self::new("plans")
    }
}

impl FsPlanStore {
    /// Store plans in `plans_dir`, relative to the project unless absolute
    pub fn new(plans_dir: impl Into<PathBuf>) -> Self {
        Self {
            plans_dir: plans_dir.into(),
        }
    }

    /// Directory plans for `project_path` are written to
    pub fn dir_for(&self, project_path: &Path) -> PathBuf {
        project_path.join(&self.plans_dir)
    }
}

#[async_trait]
impl PlanStore for FsPlanStore {
    async fn create_plan_file(
        &self,
        project_path: &Path,
        name: &str,
        content: &str,
    ) -> Result<String> {
        let dir = self.dir_for(project_path);
        tokio::fs::create_dir_all(&dir).await?;

        let base = generate_file_name(name);
        let stem = base.trim_end_matches(".md");
        for attempt in 1..=MAX_NAME_ATTEMPTS {
            let file_name = if attempt == 1 {
                base.clone()
            } else {
                format!("{}-{}.md", stem, attempt)
            };
            let path = dir.join(&file_name);
            let opened = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    file.flush().await?;
                    tracing::info!("Created plan file {}", path.display());
                    return Ok(file_name);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::PlanStore(format!(
            "no free file name for {} in {}",
            base,
            dir.display()
        )))
    }

    async fn update_plan_file(
        &self,
        project_path: &Path,
        file_name: &str,
        content: &str,
    ) -> Result<()> {
        if Path::new(file_name).file_name().and_then(|n| n.to_str()) != Some(file_name) {
            return Err(Error::PlanStore(format!(
                "invalid plan file name: {}",
                file_name
            )));
        }
        let path = self.dir_for(project_path).join(file_name);
        tokio::fs::write(&path, content).await?;
        tracing::debug!("Updated plan file {}", path.display());
        Ok(())
    }
}

/// File name for a plan title: lowercase words joined by dashes, `.md`
/// appended. Falls back to `plan.md`.
pub fn generate_file_name(title: &str) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "plan.md".to_string()
    } else {
        format!("{}.md", slug)
    }
}

/// A display name for plan content: the first heading, else the first
/// non-empty line when it is short.
pub fn extract_name_from_content(content: &str) -> Option<String> {
    if let Some(heading) = PatternSet::shared().first_heading(content) {
        return Some(heading);
    }
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_start_matches(['#', '*', '-']).trim();
    if line.is_empty() || line.chars().count() > MAX_NAME_LINE_CHARS {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_project() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quire-plans-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_generate_file_name() {
        assert_eq!(generate_file_name("Implementation Plan"), "implementation-plan.md");
        assert_eq!(generate_file_name("  Phase 1: Auth & Login!  "), "phase-1-auth-login.md");
        assert_eq!(generate_file_name("Überblick"), "überblick.md");
        assert_eq!(generate_file_name(""), "plan.md");
        assert_eq!(generate_file_name("!!!"), "plan.md");
    }

    #[test]
    fn test_generate_file_name_truncates() {
        let name = generate_file_name(&"word ".repeat(40));
        let stem = name.trim_end_matches(".md");
        assert!(stem.chars().count() <= MAX_SLUG_CHARS);
        assert!(!stem.ends_with('-'));
    }

    #[test]
    fn test_extract_name_from_content() {
        assert_eq!(
            extract_name_from_content("intro\n## Database migration\nbody").as_deref(),
            Some("Database migration")
        );
        assert_eq!(
            extract_name_from_content("\n- Tidy the build\n- more").as_deref(),
            Some("Tidy the build")
        );
        assert_eq!(extract_name_from_content(&"x".repeat(200)), None);
        assert_eq!(extract_name_from_content(""), None);
    }

    #[tokio::test]
    async fn test_create_never_overwrites() {
        let project = temp_project();
        let store = FsPlanStore::default();

        let first = store
            .create_plan_file(&project, "Feature Plan", "one")
            .await
            .unwrap();
        let second = store
            .create_plan_file(&project, "Feature Plan", "two")
            .await
            .unwrap();
        assert_eq!(first, "feature-plan.md");
        assert_eq!(second, "feature-plan-2.md");

        let dir = store.dir_for(&project);
        assert_eq!(std::fs::read_to_string(dir.join(&first)).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(dir.join(&second)).unwrap(), "two");

        std::fs::remove_dir_all(&project).unwrap();
    }

    #[tokio::test]
    async fn test_update_replaces_content() {
        let project = temp_project();
        let store = FsPlanStore::new("docs/plans");
        let file = store
            .create_plan_file(&project, "Rollout", "draft")
            .await
            .unwrap();
        store
            .update_plan_file(&project, &file, "final text")
            .await
            .unwrap();
        let path = project.join("docs/plans").join(&file);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "final text");

        std::fs::remove_dir_all(&project).unwrap();
    }

    #[tokio::test]
    async fn test_update_rejects_paths() {
        let project = temp_project();
        let store = FsPlanStore::default();
        let err = store
            .update_plan_file(&project, "../escape.md", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PlanStore(_)));

        std::fs::remove_dir_all(&project).unwrap();
    }
}

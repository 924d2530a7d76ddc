//! Guarded self-modification of the repository working tree.
//!
//! Every change goes through [`MutationGuard::apply`]: take the global
//! lock, resolve the path inside the root, write atomically, run the
//! validation command, then commit or put the old bytes back.

use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::sync::{Mutex as TokioMutex, MutexGuard};
use tracing::{debug, error, info, warn};

use scout_config::RepositoryConfig;
use scout_core::{CommitId, Result, ScoutError};

/// Validation output kept in a failure report.
const MAX_VALIDATION_OUTPUT: usize = 4_000;

/// The new content for a target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Replace (or create) the whole file.
    Replace(String),
    /// Exact search/replace; `old` must occur exactly once.
    Edit { old: String, new: String },
}

/// One self-modification, consumed by [`MutationGuard::apply`].
#[derive(Debug, Clone)]
pub struct MutationRequest {
    /// Path relative to the repository root.
    pub path: String,
    pub change: Change,
    /// Shell command that must exit 0 for the change to be kept.
    pub validation_command: String,
    /// Conversation and tool call named in the commit message.
    pub conversation: String,
    pub tool_call_id: String,
    /// One-line description used as the commit subject.
    pub summary: Option<String>,
    /// Give up, leaving the tree as it was, once this passes.
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    Committed { commit_id: CommitId, path: String },
    /// The working tree was restored; `details` holds the validation output.
    ValidationFailed { details: String },
    /// The file already had this content. Nothing was validated or committed.
    Unchanged,
    /// The request's deadline passed first; nothing was committed and the
    /// working tree is as it was.
    DeadlineExpired { details: String },
}

enum Validation {
    Passed,
    Failed(String),
    /// Cut short by the request deadline rather than the validation timeout.
    Expired,
}

/// What to put back if a mutation is rejected.
struct Snapshot {
    target: PathBuf,
    prior: Option<Vec<u8>>,
    /// Directories created for a new file, deepest first.
    created_dirs: Vec<PathBuf>,
}

/// Serializes every write to the repository working tree.
#[derive(Clone)]
pub struct MutationGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    /// Canonical repository root.
    root: PathBuf,
    validation_timeout: Duration,
    commit_prefix: String,
    lock: TokioMutex<()>,
}

impl MutationGuard {
    pub fn new(root: impl AsRef<Path>, validation_timeout: Duration, commit_prefix: impl Into<String>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .map_err(|e| ScoutError::Repository(format!("repository root {}: {e}", root.display())))?;
        Ok(Self {
            inner: Arc::new(GuardInner {
                root,
                validation_timeout,
                commit_prefix: commit_prefix.into(),
                lock: TokioMutex::new(()),
            }),
        })
    }

    pub fn from_config(config: &RepositoryConfig) -> Result<Self> {
        Self::new(
            &config.root,
            Duration::from_secs(config.validation_timeout_secs),
            config.commit_prefix.clone(),
        )
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Resolve a repository-relative path without touching the lock.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        self.inner.resolve(path)
    }

    /// Path of `target` relative to the root, with `/` separators.
    pub fn relative(&self, target: &Path) -> String {
        self.inner.relative(target)
    }

    /// Hold the mutation lock for work that touches the tree outside
    /// [`apply`](Self::apply), such as shell commands.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.inner.lock.lock().await
    }

    /// Apply a change all-or-nothing.
    ///
    /// The work runs on its own task: dropping the returned future still
    /// lets the change finish committing or reverting. Past the request's
    /// deadline it reverts instead of committing.
    pub async fn apply(&self, request: MutationRequest) -> Result<MutationOutcome> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.apply_locked(request).await })
            .await
            .map_err(|e| ScoutError::Repository(format!("mutation task failed: {e}")))?
    }

    /// Current `HEAD` commit, if the root is a git repository with history.
    pub async fn head(&self) -> Option<CommitId> {
        self.inner
            .git(&["rev-parse", "HEAD"])
            .await
            .ok()
            .map(|s| s.trim().to_string())
    }
}

impl GuardInner {
    async fn apply_locked(&self, request: MutationRequest) -> Result<MutationOutcome> {
        let _lock = match request.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline.into(), self.lock.lock()).await {
                Ok(lock) => lock,
                Err(_) => {
                    warn!(path = %request.path, "deadline passed waiting for the mutation lock");
                    return Ok(MutationOutcome::DeadlineExpired {
                        details: "another change held the repository until the deadline; nothing was written".into(),
                    });
                }
            },
            None => self.lock.lock().await,
        };

        let target = self.resolve(&request.path)?;
        let rel = self.relative(&target);
        let prior = read_existing(&target, &rel).await?;
        let content = render(&request.change, prior.as_deref(), &rel)?;

        if prior.as_deref() == Some(content.as_bytes()) {
            debug!(path = %rel, "content unchanged; skipping validation");
            return Ok(MutationOutcome::Unchanged);
        }

        let snapshot = Snapshot {
            created_dirs: create_parents(&target).await?,
            target,
            prior,
        };

        if let Err(e) = write_atomic(&snapshot.target, content.into_bytes()).await {
            self.restore(&snapshot).await;
            return Err(e);
        }
        info!(path = %rel, conversation = %request.conversation, "change written; validating");

        match self.run_validation(&request.validation_command, request.deadline).await {
            Ok(Validation::Passed) => {}
            Ok(Validation::Failed(details)) => {
                warn!(path = %rel, "validation failed; reverting");
                self.restore(&snapshot).await;
                return Ok(MutationOutcome::ValidationFailed { details });
            }
            Ok(Validation::Expired) => {
                warn!(path = %rel, "deadline passed during validation; reverting");
                self.restore(&snapshot).await;
                return Ok(MutationOutcome::DeadlineExpired {
                    details: format!("validation of {rel} did not finish before the deadline; the change was reverted"),
                });
            }
            Err(e) => {
                self.restore(&snapshot).await;
                return Err(e);
            }
        }

        if request.deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(path = %rel, "deadline passed before commit; reverting");
            self.restore(&snapshot).await;
            return Ok(MutationOutcome::DeadlineExpired {
                details: format!("{rel} passed validation after the deadline; the change was reverted"),
            });
        }

        match self.commit(&rel, &request).await {
            Ok(commit_id) => {
                info!(path = %rel, commit = %commit_id, "change committed");
                Ok(MutationOutcome::Committed { commit_id, path: rel })
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "commit failed; reverting");
                if let Err(reset) = self.git(&["reset", "--quiet", "--", &rel]).await {
                    error!(path = %rel, error = %reset, "failed to unstage change");
                }
                self.restore(&snapshot).await;
                Err(e)
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let escape = || ScoutError::PathEscapesRepository(path.to_string());

        let mut normalized = PathBuf::new();
        for component in Path::new(path.trim()).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        // Symlinks: the deepest existing ancestor must still resolve under the root.
        let joined = self.root.join(&normalized);
        let mut existing = joined.as_path();
        let resolved = loop {
            match std::fs::canonicalize(existing) {
                Ok(real) => {
                    let rest = joined.strip_prefix(existing).map_err(|_| escape())?;
                    // Joining an empty remainder would append a trailing separator.
                    break if rest.as_os_str().is_empty() { real } else { real.join(rest) };
                }
                Err(_) => existing = existing.parent().ok_or_else(escape)?,
            }
        };

        let inside = resolved.strip_prefix(&self.root).map_err(|_| escape())?;
        if inside.components().next().is_some_and(|c| c.as_os_str() == ".git") {
            return Err(escape());
        }
        Ok(resolved)
    }

    fn relative(&self, target: &Path) -> String {
        let rel = target.strip_prefix(&self.root).unwrap_or(target);
        let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        if parts.is_empty() { ".".to_string() } else { parts.join("/") }
    }

    async fn run_validation(&self, command: &str, deadline: Option<Instant>) -> Result<Validation> {
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let (limit, capped) = match remaining {
            Some(left) if left < self.validation_timeout => (left, true),
            _ => (self.validation_timeout, false),
        };

        info!(command, "running validation command");
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) if capped => return Ok(Validation::Expired),
            Err(_) => {
                return Ok(Validation::Failed(format!(
                    "`{command}` timed out after {}s",
                    self.validation_timeout.as_secs()
                )));
            }
        };

        if output.status.success() {
            return Ok(Validation::Passed);
        }

        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(Validation::Failed(format!(
            "`{command}` exited with {code}\n{}",
            tail(combined.trim(), MAX_VALIDATION_OUTPUT)
        )))
    }

    async fn commit(&self, rel: &str, request: &MutationRequest) -> Result<CommitId> {
        self.git(&["add", "--", rel]).await?;

        let subject = request
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("update {rel}"));
        let message = format!(
            "{} {subject}\n\nconversation: {}\ntool-call: {}",
            self.commit_prefix, request.conversation, request.tool_call_id
        );
        self.git(&["commit", "--quiet", "-m", message.trim_start(), "--", rel]).await?;

        let head = self.git(&["rev-parse", "HEAD"]).await?;
        Ok(head.trim().to_string())
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ScoutError::Repository(format!("cannot run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoutError::Repository(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn restore(&self, snapshot: &Snapshot) {
        let result = match &snapshot.prior {
            Some(bytes) => write_atomic(&snapshot.target, bytes.clone()).await,
            None => remove_created(&snapshot.target, &snapshot.created_dirs).await,
        };
        let rel = self.relative(&snapshot.target);
        match result {
            Ok(()) => info!(path = %rel, "working tree restored"),
            Err(e) => error!(path = %rel, error = %e, "failed to restore working tree"),
        }
    }
}

async fn read_existing(target: &Path, rel: &str) -> Result<Option<Vec<u8>>> {
    match tokio::fs::metadata(target).await {
        Ok(meta) if meta.is_dir() => Err(ScoutError::Repository(format!("{rel} is a directory"))),
        Ok(_) => Ok(Some(tokio::fs::read(target).await?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn render(change: &Change, prior: Option<&[u8]>, rel: &str) -> Result<String> {
    match change {
        Change::Replace(content) => Ok(content.clone()),
        Change::Edit { old, new } => {
            let bytes = prior.ok_or_else(|| {
                ScoutError::Repository(format!("{rel} does not exist; use write_file to create it"))
            })?;
            let text = std::str::from_utf8(bytes)
                .map_err(|_| ScoutError::Repository(format!("{rel} is not UTF-8 text")))?;
            if old.is_empty() {
                return Err(ScoutError::Repository("'old' must not be empty".into()));
            }
            match text.matches(old.as_str()).count() {
                0 => Err(ScoutError::Repository(format!("'old' text not found in {rel}"))),
                1 => Ok(text.replacen(old.as_str(), new, 1)),
                n => Err(ScoutError::Repository(format!(
                    "'old' text matches {n} times in {rel}; include more surrounding context"
                ))),
            }
        }
    }
}

/// Create missing parent directories, returning the ones created, deepest first.
async fn create_parents(target: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut dir = target.parent();
    while let Some(d) = dir {
        if tokio::fs::try_exists(d).await? {
            break;
        }
        missing.push(d.to_path_buf());
        dir = d.parent();
    }
    if let Some(parent) = missing.first() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(missing)
}

async fn remove_created(target: &Path, created_dirs: &[PathBuf]) -> Result<()> {
    match tokio::fs::remove_file(target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    for dir in created_dirs {
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            debug!(dir = %dir.display(), error = %e, "left created directory in place");
        }
    }
    Ok(())
}

/// Write through a temp file in the same directory and rename it over the
/// target, keeping the target's permissions.
async fn write_atomic(target: &Path, bytes: Vec<u8>) -> Result<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let dir = target
            .parent()
            .ok_or_else(|| std::io::Error::other("target has no parent directory"))?;
        let permissions = std::fs::metadata(&target).ok().map(|m| m.permissions());
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ScoutError::Repository(format!("write task failed: {e}")))??;
    Ok(())
}

/// Last `max` characters of `text`.
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let start = text.char_indices().nth(count - max).map(|(i, _)| i).unwrap_or(0);
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_edit_requires_single_match() {
        let edit = |old: &str| Change::Edit {
            old: old.into(),
            new: "B".into(),
        };
        assert_eq!(render(&edit("a"), Some(b"xay"), "f").unwrap(), "xBy");
        assert!(render(&edit("z"), Some(b"xay"), "f").is_err());
        assert!(render(&edit("a"), Some(b"aa"), "f").is_err());
        assert!(render(&edit("a"), None, "f").is_err());
        assert!(render(&edit(""), Some(b"aa"), "f").is_err());
    }

    #[test]
    fn test_tail_keeps_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let guard = MutationGuard::new(dir.path(), Duration::from_secs(5), "scout:").unwrap();
        for bad in ["/etc/passwd", "../outside.txt", "src/../../x", ".git/config", "./.git/HEAD"] {
            assert!(
                matches!(guard.resolve(bad), Err(ScoutError::PathEscapesRepository(_))),
                "{bad} should be rejected"
            );
        }
        let ok = guard.resolve("src/new/file.rs").unwrap();
        assert!(ok.starts_with(guard.root()));
        assert_eq!(guard.relative(&ok), "src/new/file.rs");
        assert_eq!(guard.relative(&guard.resolve(".").unwrap()), ".");
    }

    #[tokio::test]
    async fn test_resolve_existing_file_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.txt"), "v1\n").unwrap();
        let guard = MutationGuard::new(dir.path(), Duration::from_secs(5), "scout:").unwrap();

        let target = guard.resolve("app.txt").unwrap();
        assert_eq!(target, guard.root().join("app.txt"));
        assert!(!target.to_string_lossy().ends_with('/'));
        assert_eq!(guard.relative(&target), "app.txt");
        assert_eq!(read_existing(&target, "app.txt").await.unwrap(), Some(b"v1\n".to_vec()));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let guard = MutationGuard::new(dir.path(), Duration::from_secs(5), "scout:").unwrap();
        assert!(matches!(
            guard.resolve("link/file.txt"),
            Err(ScoutError::PathEscapesRepository(_))
        ));
    }
}

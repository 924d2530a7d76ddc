#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::process::Command;
    use std::time::{Duration, Instant};

    use scout_core::ScoutError;
    use scout_runtime::{Change, MutationGuard, MutationOutcome, MutationRequest};
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(output.status.success(), "git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A git repository with one committed file, `app.txt`.
    fn repo() -> Option<(TempDir, MutationGuard)> {
        if !git_available() {
            eprintln!("git not installed; skipping");
            return None;
        }
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.email", "scout@example.com"]);
        git(dir.path(), &["config", "user.name", "Scout Tests"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.path().join("app.txt"), "version = 1\n").unwrap();
        git(dir.path(), &["add", "app.txt"]);
        git(dir.path(), &["commit", "--quiet", "-m", "initial"]);

        let guard = MutationGuard::new(dir.path(), Duration::from_secs(30), "[scout]").unwrap();
        Some((dir, guard))
    }

    fn request(path: &str, change: Change, validation: &str) -> MutationRequest {
        MutationRequest {
            path: path.into(),
            change,
            validation_command: validation.into(),
            conversation: "chat-1".into(),
            tool_call_id: "call_1".into(),
            summary: Some("bump version".into()),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_passing_change_is_committed() {
        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);

        let outcome = guard
            .apply(request("app.txt", Change::Replace("version = 2\n".into()), "grep -q 'version = 2' app.txt"))
            .await
            .unwrap();

        let MutationOutcome::Committed { commit_id, path } = outcome else {
            panic!("expected a commit, got {outcome:?}");
        };
        assert_eq!(path, "app.txt");
        assert_ne!(commit_id, before);
        assert_eq!(commit_id, git(dir.path(), &["rev-parse", "HEAD"]));
        assert_eq!(std::fs::read_to_string(dir.path().join("app.txt")).unwrap(), "version = 2\n");

        let message = git(dir.path(), &["log", "-1", "--format=%B"]);
        assert!(message.starts_with("[scout] bump version"));
        assert!(message.contains("conversation: chat-1"));
        assert!(message.contains("tool-call: call_1"));
        assert_eq!(git(dir.path(), &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn test_failed_validation_restores_file_and_skips_commit() {
        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);
        let original = std::fs::read(dir.path().join("app.txt")).unwrap();

        let outcome = guard
            .apply(request(
                "app.txt",
                Change::Replace("syntax error\n".into()),
                "echo 'build broke' >&2; exit 3",
            ))
            .await
            .unwrap();

        let MutationOutcome::ValidationFailed { details } = outcome else {
            panic!("expected validation failure, got {outcome:?}");
        };
        assert!(details.contains("exited with 3"));
        assert!(details.contains("build broke"));
        assert_eq!(std::fs::read(dir.path().join("app.txt")).unwrap(), original);
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
        assert_eq!(git(dir.path(), &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn test_failed_new_file_is_removed_with_its_directories() {
        let Some((dir, guard)) = repo() else { return };

        let outcome = guard
            .apply(request("docs/notes/todo.md", Change::Replace("- one\n".into()), "false"))
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::ValidationFailed { .. }));
        assert!(!dir.path().join("docs/notes/todo.md").exists());
        assert!(!dir.path().join("docs").exists());
        assert_eq!(git(dir.path(), &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn test_identical_content_is_unchanged() {
        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);

        let outcome = guard
            .apply(request("app.txt", Change::Replace("version = 1\n".into()), "false"))
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Unchanged);
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
    }

    #[tokio::test]
    async fn test_edit_replaces_single_occurrence() {
        let Some((dir, guard)) = repo() else { return };

        let outcome = guard
            .apply(request(
                "app.txt",
                Change::Edit {
                    old: "= 1".into(),
                    new: "= 5".into(),
                },
                "true",
            ))
            .await
            .unwrap();
        assert!(matches!(outcome, MutationOutcome::Committed { .. }));
        assert_eq!(std::fs::read_to_string(dir.path().join("app.txt")).unwrap(), "version = 5\n");

        let missing = guard
            .apply(request(
                "app.txt",
                Change::Edit {
                    old: "not present".into(),
                    new: "x".into(),
                },
                "true",
            ))
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_escaping_paths_are_rejected_before_any_write() {
        let Some((dir, guard)) = repo() else { return };
        let marker = dir.path().join("validation-ran");
        let validation = format!("touch {}", marker.display());
        let before = git(dir.path(), &["rev-parse", "HEAD"]);

        for path in ["../outside.txt", "/etc/scout-test", "src/../../outside.txt", ".git/config"] {
            let result = guard
                .apply(request(path, Change::Replace("pwned".into()), &validation))
                .await;
            assert!(
                matches!(result, Err(ScoutError::PathEscapesRepository(_))),
                "{path} was not rejected: {result:?}"
            );
        }

        assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
        assert!(!marker.exists());
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
    }

    #[tokio::test]
    async fn test_mutations_never_overlap() {
        let Some((dir, guard)) = repo() else { return };
        let log_dir = TempDir::new().unwrap();
        let log = log_dir.path().join("validation.log");
        let validation = format!(
            "echo start >> {log}; sleep 0.3; echo end >> {log}",
            log = log.display()
        );

        let first = {
            let guard = guard.clone();
            let validation = validation.clone();
            tokio::spawn(async move {
                guard
                    .apply(request("one.txt", Change::Replace("1\n".into()), &validation))
                    .await
            })
        };
        let second = {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .apply(request("two.txt", Change::Replace("2\n".into()), &validation))
                    .await
            })
        };

        assert!(matches!(first.await.unwrap().unwrap(), MutationOutcome::Committed { .. }));
        assert!(matches!(second.await.unwrap().unwrap(), MutationOutcome::Committed { .. }));

        let lines: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines, vec!["start", "end", "start", "end"]);
        assert_eq!(git(dir.path(), &["rev-list", "--count", "HEAD"]), "3");
    }

    #[tokio::test]
    async fn test_deadline_during_validation_reverts_without_commit() {
        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);

        let mut slow = request("app.txt", Change::Replace("version = 2\n".into()), "sleep 2");
        slow.deadline = Some(Instant::now() + Duration::from_millis(300));
        let outcome = guard.apply(slow).await.unwrap();

        let MutationOutcome::DeadlineExpired { details } = outcome else {
            panic!("expected the deadline to expire, got {outcome:?}");
        };
        assert!(details.contains("reverted"));
        assert_eq!(std::fs::read_to_string(dir.path().join("app.txt")).unwrap(), "version = 1\n");

        // Nothing lands once the validation command would have finished.
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
        assert_eq!(git(dir.path(), &["status", "--porcelain"]), "");
    }

    #[tokio::test]
    async fn test_deadline_while_waiting_for_lock_writes_nothing() {
        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);
        let held = guard.exclusive().await;

        let mut queued = request("app.txt", Change::Replace("version = 2\n".into()), "true");
        queued.deadline = Some(Instant::now() + Duration::from_millis(200));
        let outcome = guard.apply(queued).await.unwrap();
        drop(held);

        assert!(matches!(outcome, MutationOutcome::DeadlineExpired { .. }), "got {outcome:?}");
        assert_eq!(std::fs::read_to_string(dir.path().join("app.txt")).unwrap(), "version = 1\n");
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_commit_failure_reverts_and_unstages() {
        use std::os::unix::fs::PermissionsExt;

        let Some((dir, guard)) = repo() else { return };
        let before = git(dir.path(), &["rev-parse", "HEAD"]);
        let hook = dir.path().join(".git/hooks/pre-commit");
        std::fs::create_dir_all(hook.parent().unwrap()).unwrap();
        std::fs::write(&hook, "#!/bin/sh\necho 'hook says no' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();

        let result = guard
            .apply(request("app.txt", Change::Replace("version = 2\n".into()), "true"))
            .await;

        assert!(matches!(result, Err(ScoutError::Repository(ref m)) if m.contains("hook says no")), "{result:?}");
        assert_eq!(std::fs::read_to_string(dir.path().join("app.txt")).unwrap(), "version = 1\n");
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), before);
        assert_eq!(git(dir.path(), &["status", "--porcelain"]), "");
    }
}

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::platform::{PlatformError, Result, with_timeout};

use super::refs::RefSet;
use super::remote::Remote;
use super::{RefTransport, TombstoneCommit};

/// Refspecs that define the mirrored ref set.
const MIRROR_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// Identity recorded on tombstone commits.
const COMMIT_IDENTITY: (&str, &str) = ("orgmirror", "orgmirror@localhost");

/// `RefTransport` that shells out to the `git` binary.
///
/// Working mirrors are bare repositories. Credentials are passed on the
/// command line only, never written to the repository config.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: PathBuf,
    call_timeout: Duration,
}

impl GitCli {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            git: PathBuf::from("git"),
            call_timeout,
        }
    }

    /// Use a specific git executable.
    #[must_use]
    pub fn with_binary(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Run git, returning stdout. Network commands pass their remote so its
    /// secret can be scrubbed from error output.
    async fn run(
        &self,
        operation: &str,
        dir: Option<&Path>,
        args: &[&str],
        stdin: Option<&[u8]>,
        remote: Option<&Remote>,
    ) -> Result<String> {
        let mut cmd = Command::new(&self.git);
        if let Some(dir) = dir {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_AUTHOR_NAME", COMMIT_IDENTITY.0)
            .env("GIT_AUTHOR_EMAIL", COMMIT_IDENTITY.1)
            .env("GIT_COMMITTER_NAME", COMMIT_IDENTITY.0)
            .env("GIT_COMMITTER_EMAIL", COMMIT_IDENTITY.1)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let call = async {
            let mut child = cmd
                .spawn()
                .map_err(|e| PlatformError::internal(format!("failed to spawn git: {e}")))?;

            if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
                pipe.write_all(input)
                    .await
                    .map_err(|e| PlatformError::internal(format!("git {operation} stdin: {e}")))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| PlatformError::internal(format!("git {operation}: {e}")))?;

            if output.status.success() {
                return String::from_utf8(output.stdout)
                    .map_err(|e| PlatformError::internal(format!("git {operation}: {e}")));
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = match remote {
                Some(remote) => remote.redact(stderr.trim()),
                None => stderr.trim().to_string(),
            };
            Err(classify_failure(operation, &stderr))
        };

        with_timeout(operation, self.call_timeout, call).await
    }

    async fn ensure_bare(&self, work_dir: &Path) -> Result<()> {
        if work_dir.join("HEAD").exists() {
            return Ok(());
        }
        if let Some(parent) = work_dir.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                PlatformError::internal(format!("create {}: {e}", parent.display()))
            })?;
        }
        let path = work_dir.to_string_lossy();
        self.run("init", None, &["init", "--bare", "--quiet", path.as_ref()], None, None)
            .await?;
        Ok(())
    }

    async fn local_refs(&self, work_dir: &Path) -> Result<RefSet> {
        let out = self
            .run(
                "for-each-ref",
                Some(work_dir),
                &[
                    "for-each-ref",
                    "--format=%(objectname) %(refname)",
                    "refs/heads",
                    "refs/tags",
                ],
                None,
                None,
            )
            .await?;
        Ok(RefSet::parse(&out))
    }
}

#[async_trait]
impl RefTransport for GitCli {
    async fn ls_remote(&self, remote: &Remote) -> Result<RefSet> {
        let url = remote.authenticated_url()?;
        let out = self
            .run(
                "ls_remote",
                None,
                &["ls-remote", "--heads", "--tags", url.as_str()],
                None,
                Some(remote),
            )
            .await?;
        Ok(RefSet::parse(&out))
    }

    async fn fetch_mirror(&self, source: &Remote, work_dir: &Path) -> Result<RefSet> {
        self.ensure_bare(work_dir).await?;
        let url = source.authenticated_url()?;

        let mut args = vec!["fetch", "--prune", "--quiet", url.as_str()];
        args.extend(MIRROR_REFSPECS);
        self.run("fetch_mirror", Some(work_dir), &args, None, Some(source))
            .await?;

        self.local_refs(work_dir).await
    }

    async fn push_mirror(&self, work_dir: &Path, destination: &Remote) -> Result<()> {
        let url = destination.authenticated_url()?;

        // Forced and pruned within branches and tags: the destination ends
        // up with exactly the local ref set.
        let mut args = vec!["push", "--force", "--prune", "--quiet", url.as_str()];
        args.extend(MIRROR_REFSPECS.map(|spec| spec.trim_start_matches('+')));
        self.run("push_mirror", Some(work_dir), &args, None, Some(destination))
            .await?;
        Ok(())
    }

    async fn push_tombstone(
        &self,
        work_dir: &Path,
        destination: &Remote,
        commit: &TombstoneCommit,
    ) -> Result<()> {
        self.ensure_bare(work_dir).await?;
        let url = destination.authenticated_url()?;
        let branch_ref = format!("refs/heads/{}", commit.branch);

        let remote_refs = self.ls_remote(destination).await?;
        let parent = remote_refs.branch_head(&commit.branch).map(str::to_string);
        if let Some(parent) = &parent {
            let refspec = format!("+{branch_ref}:refs/orgmirror/tombstone-base");
            self.run(
                "fetch_tombstone_base",
                Some(work_dir),
                &["fetch", "--quiet", url.as_str(), refspec.as_str()],
                None,
                Some(destination),
            )
            .await?;
            tracing::debug!(parent = %parent, branch = %commit.branch, "Tombstone parent fetched");
        }

        let blob = self
            .run(
                "hash-object",
                Some(work_dir),
                &["hash-object", "-w", "--stdin"],
                Some(commit.content.as_bytes()),
                None,
            )
            .await?;
        let tree_entry = format!("100644 blob {}\t{}\n", blob.trim(), commit.path);
        let tree = self
            .run(
                "mktree",
                Some(work_dir),
                &["mktree"],
                Some(tree_entry.as_bytes()),
                None,
            )
            .await?;

        let tree = tree.trim().to_string();
        let mut args = vec!["commit-tree", tree.as_str(), "-m", commit.message.as_str()];
        if let Some(parent) = &parent {
            args.extend(["-p", parent.as_str()]);
        }
        let sha = self
            .run("commit-tree", Some(work_dir), &args, None, None)
            .await?;

        let refspec = format!("{}:{branch_ref}", sha.trim());
        self.run(
            "push_tombstone",
            Some(work_dir),
            &["push", "--quiet", url.as_str(), refspec.as_str()],
            None,
            Some(destination),
        )
        .await?;
        Ok(())
    }
}

/// Map git's stderr to a `PlatformError`.
fn classify_failure(operation: &str, stderr: &str) -> PlatformError {
    let lower = stderr.to_lowercase();
    let message = format!("git {operation}: {stderr}");

    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission to")
        || lower.contains("403")
    {
        PlatformError::permission_denied(message)
    } else if lower.contains("rate limit") {
        PlatformError::RateLimited { reset_at: None }
    } else if lower.contains("repository not found")
        || lower.contains("does not appear to be a git repository")
        || lower.contains("not found")
    {
        PlatformError::not_found(message)
    } else if lower.contains("could not resolve host")
        || lower.contains("unable to access")
        || lower.contains("connection")
        || lower.contains("early eof")
        || lower.contains("remote end hung up")
    {
        PlatformError::network(message)
    } else {
        PlatformError::api(None, message)
    }
}

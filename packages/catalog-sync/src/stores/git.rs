//! Git-backed version store.
//!
//! Every run clones the data repository into a fresh temporary directory
//! and works there. The directory is removed when the working copy is
//! dropped, so nothing carries over between runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretBox};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::validate_path;
use crate::error::{StoreError, StoreResult};
use crate::traits::store::{CommitAuthor, RemoteBranch, StoreConnector, VersionStore};

const REMOTE: &str = "origin";

/// Username and token for HTTPS remotes. Never printed.
pub struct GitCredentials {
    username: String,
    token: SecretBox<str>,
}

impl GitCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: SecretBox::new(Box::from(token.into().as_str())),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

impl Clone for GitCredentials {
    fn clone(&self) -> Self {
        Self::new(self.username.clone(), self.token().to_string())
    }
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Where the data repository lives.
#[derive(Debug, Clone)]
pub struct GitRemoteConfig {
    /// HTTPS URL or local path of the remote
    pub url: String,

    pub credentials: Option<GitCredentials>,

    /// Branch used to decide whether other branches are merged
    pub base_branch: String,
}

impl GitRemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            base_branch: "main".to_string(),
        }
    }

    pub fn with_credentials(mut self, credentials: GitCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = branch.into();
        self
    }

    /// Remote URL with credentials embedded for HTTP(S) remotes. Local paths
    /// and other schemes are returned unchanged.
    fn authenticated_url(&self) -> StoreResult<String> {
        let Some(credentials) = &self.credentials else {
            return Ok(self.url.clone());
        };

        let mut url = match Url::parse(&self.url) {
            Ok(url) if url.scheme() == "https" || url.scheme() == "http" => url,
            _ => return Ok(self.url.clone()),
        };

        url.set_username(credentials.username())
            .and_then(|()| url.set_password(Some(credentials.token())))
            .map_err(|()| StoreError::InvalidRemote(self.url.clone()))?;

        Ok(url.to_string())
    }

    fn secret(&self) -> Option<String> {
        self.credentials
            .as_ref()
            .map(|c| c.token().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Clones the remote once per run.
#[derive(Debug, Clone)]
pub struct GitConnector {
    config: GitRemoteConfig,
}

impl GitConnector {
    pub fn new(config: GitRemoteConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl StoreConnector for GitConnector {
    type Store = GitWorkingCopy;

    async fn connect(&self) -> StoreResult<GitWorkingCopy> {
        let dir = tempfile::Builder::new().prefix("catalog-sync-").tempdir()?;
        let url = self.config.authenticated_url()?;
        let redact = self.config.secret();

        GitCommand::new(["clone", "--quiet", "--no-tags"])
            .arg(url)
            .arg(dir.path().to_string_lossy())
            .redact(redact.clone())
            .run()
            .await
            .map_err(|err| match err {
                StoreError::Command { stderr, .. } => StoreError::Unavailable(stderr),
                other => other,
            })?;

        info!(path = %dir.path().display(), "Cloned data repository");

        Ok(GitWorkingCopy {
            dir,
            base_branch: self.config.base_branch.clone(),
            redact,
        })
    }
}

/// A temporary clone of the data repository.
pub struct GitWorkingCopy {
    dir: TempDir,
    base_branch: String,
    redact: Option<String>,
}

impl GitWorkingCopy {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git<I, S>(&self, args: I) -> GitCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GitCommand::new(args)
            .cwd(self.dir.path())
            .redact(self.redact.clone())
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        validate_path(path)?;
        Ok(self.dir.path().join(path))
    }

    async fn ref_exists(&self, reference: &str) -> StoreResult<bool> {
        let output = self
            .git(["rev-parse", "--verify", "--quiet"])
            .arg(reference)
            .run_unchecked()
            .await?;
        Ok(output.success)
    }
}

#[async_trait]
impl VersionStore for GitWorkingCopy {
    async fn checkout(&mut self, reference: &str) -> StoreResult<()> {
        if self.ref_exists(&format!("refs/heads/{}", reference)).await? {
            self.git(["checkout", "--quiet"]).arg(reference).run().await?;
        } else if self
            .ref_exists(&format!("refs/remotes/{}/{}", REMOTE, reference))
            .await?
        {
            self.git(["checkout", "--quiet", "-b"])
                .arg(reference)
                .arg("--track")
                .arg(format!("{}/{}", REMOTE, reference))
                .run()
                .await?;
        } else if !self.ref_exists("HEAD").await? {
            // Empty repository: start the branch from nothing
            self.git(["symbolic-ref", "HEAD"])
                .arg(format!("refs/heads/{}", reference))
                .run()
                .await?;
        } else {
            return Err(StoreError::UnknownRef(reference.to_string()));
        }

        debug!(branch = %reference, "Checked out branch");
        Ok(())
    }

    async fn current_branch(&self) -> StoreResult<Option<String>> {
        let output = self
            .git(["symbolic-ref", "--quiet", "--short", "HEAD"])
            .run_unchecked()
            .await?;
        if !output.success {
            return Ok(None);
        }
        let branch = output.stdout.trim().to_string();
        Ok((!branch.is_empty()).then_some(branch))
    }

    async fn list_remote_branches(&self) -> StoreResult<Vec<RemoteBranch>> {
        let prefix = format!("refs/remotes/{}", REMOTE);
        let names = self
            .git(["for-each-ref", "--format=%(refname:lstrip=3)"])
            .arg(&prefix)
            .run()
            .await?
            .lines();

        let base_ref = format!("{}/{}", REMOTE, self.base_branch);
        let merged = if self
            .ref_exists(&format!("refs/remotes/{}", base_ref))
            .await?
        {
            self.git(["for-each-ref", "--format=%(refname:lstrip=3)"])
                .arg(format!("--merged={}", base_ref))
                .arg(&prefix)
                .run()
                .await?
                .lines()
        } else {
            Vec::new()
        };

        Ok(names
            .into_iter()
            .filter(|name| name != "HEAD")
            .map(|name| RemoteBranch {
                merged: merged.contains(&name),
                name,
            })
            .collect())
    }

    async fn create_branch(&mut self, name: &str, checkout: bool) -> StoreResult<()> {
        if checkout {
            self.git(["checkout", "--quiet", "-b"]).arg(name).run().await?;
        } else {
            self.git(["branch"]).arg(name).run().await?;
        }
        debug!(branch = %name, checkout, "Created branch");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_file(&mut self, path: &str, contents: &[u8]) -> StoreResult<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, contents).await?;
        Ok(())
    }

    async fn stage(&mut self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        self.git(["add", "--"]).arg(path).run().await?;
        Ok(())
    }

    async fn commit(
        &mut self,
        message: &str,
        author: &CommitAuthor,
    ) -> StoreResult<Option<String>> {
        let staged = self
            .git(["diff", "--cached", "--quiet"])
            .run_unchecked()
            .await?;
        match staged.code {
            Some(0) => return Ok(None),
            Some(1) => {}
            _ => {
                return Err(StoreError::Command {
                    command: "diff --cached".to_string(),
                    stderr: staged.stderr,
                })
            }
        }

        self.git(["-c"])
            .arg(format!("user.name={}", author.name))
            .arg("-c")
            .arg(format!("user.email={}", author.email))
            .args(["commit", "--quiet", "-m"])
            .arg(message)
            .run()
            .await?;

        let head = self.git(["rev-parse", "HEAD"]).run().await?;
        Ok(Some(head.stdout.trim().to_string()))
    }

    async fn push(&mut self, branch: &str) -> StoreResult<()> {
        let output = self
            .git(["push", "--porcelain", REMOTE])
            .arg(format!("refs/heads/{0}:refs/heads/{0}", branch))
            .run_unchecked()
            .await?;

        if output.success {
            debug!(branch = %branch, "Pushed branch");
            return Ok(());
        }

        if is_push_rejection(&output.stdout) || is_push_rejection(&output.stderr) {
            return Err(StoreError::PushRejected {
                branch: branch.to_string(),
                reason: first_line(&output.stderr)
                    .or_else(|| first_line(&output.stdout))
                    .unwrap_or_else(|| "rejected by remote".to_string()),
            });
        }

        Err(StoreError::Command {
            command: "push".to_string(),
            stderr: output.stderr,
        })
    }

    fn name(&self) -> &str {
        "git"
    }
}

/// Builder for one git invocation, run without a terminal so credential
/// prompts fail instead of hanging.
struct GitCommand {
    args: Vec<String>,
    cwd: Option<PathBuf>,
    redact: Option<String>,
}

struct GitOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect()
    }
}

impl GitCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            redact: None,
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }

    fn redact(mut self, secret: Option<String>) -> Self {
        self.redact = secret;
        self
    }

    fn scrub(&self, text: &str) -> String {
        match &self.redact {
            Some(secret) => text.replace(secret.as_str(), "[REDACTED]"),
            None => text.to_string(),
        }
    }

    fn display(&self) -> String {
        self.scrub(&self.args.join(" "))
    }

    async fn run_unchecked(&self) -> StoreResult<GitOutput> {
        let mut cmd = Command::new("git");
        cmd.args(&self.args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }

        debug!(command = %self.display(), "Running git");
        let output = cmd.output().await?;

        Ok(GitOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: self.scrub(&String::from_utf8_lossy(&output.stdout)),
            stderr: self.scrub(String::from_utf8_lossy(&output.stderr).trim()),
        })
    }

    async fn run(&self) -> StoreResult<GitOutput> {
        let output = self.run_unchecked().await?;
        if !output.success {
            return Err(StoreError::Command {
                command: self.display(),
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

fn is_push_rejection(text: &str) -> bool {
    text.contains("[rejected]")
        || text.contains("non-fast-forward")
        || text.contains("fetch first")
        || text.contains("[remote rejected]")
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

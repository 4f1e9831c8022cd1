//! Git-versioned patient repositories.
//!
//! Every patient directory is a local Git repository (`git2`/libgit2). Demographics and
//! encounters are written as YAML files and committed in one step, so the repository history
//! is the record's change log:
//!
//! - **Atomic multi-file writes**: files are written and committed together; on failure the
//!   previous contents are restored and new files and directories removed.
//! - **Structured commit messages**: `<domain>:<action>: <summary>` followed by
//!   `Author-*` and `Care-Location` trailers.
//! - **Append-only history**: records are updated by new commits, never by rewriting history.
//!
//! ## Branch Policy
//!
//! All patient repositories use `refs/heads/main`.
//!
//! Commit messages are labels, not content: they never carry patient identifiers or clinical
//! text.

use crate::author::Author;
use crate::error::{RecordError, RecordResult};
use chs_types::NonEmptyText;
use std::fmt;
use std::path::{Component, Path, PathBuf};

#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::{LazyLock, Mutex};

const MAIN_REF: &str = "refs/heads/main";

/// What part of the patient record a commit touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CommitDomain {
    /// Demographics (`patient.yaml`).
    Record,
    /// A clinical encounter under `encounters/`.
    Encounter,
}

impl fmt::Display for CommitDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Encounter => "encounter",
        })
    }
}

/// `Create` for new content, `Update` when a previous version stays in history.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CommitAction {
    Create,
    Update,
}

impl fmt::Display for CommitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
        })
    }
}

/// A structured commit message.
///
/// Renders as `<domain>:<action>: <summary>`, a blank line, then the `Author-Name`,
/// `Author-Role`, `Author-Registration` (0..N, sorted) and `Care-Location` trailers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CommitMessage {
    domain: CommitDomain,
    action: CommitAction,
    summary: NonEmptyText,
    care_location: NonEmptyText,
}

impl CommitMessage {
    /// # Errors
    ///
    /// - `RecordError::InvalidInput` for an empty or multi-line summary.
    /// - `RecordError::MissingCareLocation` / `RecordError::InvalidCareLocation` for an empty or
    ///   multi-line care location.
    pub(crate) fn new(
        domain: CommitDomain,
        action: CommitAction,
        summary: impl AsRef<str>,
        care_location: impl AsRef<str>,
    ) -> RecordResult<Self> {
        let summary = summary.as_ref().trim();
        if summary.contains(['\n', '\r']) {
            return Err(RecordError::InvalidInput(
                "commit summary must be single-line".into(),
            ));
        }
        let summary = NonEmptyText::new(summary)
            .map_err(|_| RecordError::InvalidInput("commit summary must be non-empty".into()))?;

        let care_location = care_location.as_ref().trim();
        if care_location.contains(['\n', '\r']) {
            return Err(RecordError::InvalidCareLocation);
        }
        let care_location =
            NonEmptyText::new(care_location).map_err(|_| RecordError::MissingCareLocation)?;

        Ok(Self {
            domain,
            action,
            summary,
            care_location,
        })
    }

    pub(crate) fn render_with_author(&self, author: &Author) -> RecordResult<String> {
        author.validate_commit_author()?;

        let mut lines = vec![
            format!("{}:{}: {}", self.domain, self.action, self.summary.as_str()),
            String::new(),
            format!("Author-Name: {}", author.name.as_str()),
            format!("Author-Role: {}", author.role.as_str()),
        ];

        let mut regs: Vec<_> = author
            .registrations
            .iter()
            .map(|r| format!("Author-Registration: {} {}", r.authority.as_str(), r.number.as_str()))
            .collect();
        regs.sort();
        lines.extend(regs);

        lines.push(format!("Care-Location: {}", self.care_location.as_str()));
        Ok(lines.join("\n"))
    }
}

/// One file in a multi-file commit.
#[derive(Debug, Clone)]
pub struct FileToWrite<'a> {
    /// Path inside the repository; must be relative and free of `..`.
    pub relative_path: &'a Path,
    pub content: &'a str,
    /// Content to restore if the commit fails, or `None` when the file is new.
    pub old_content: Option<&'a str>,
}

fn check_relative(path: &Path) -> RecordResult<()> {
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(())
    } else {
        Err(RecordError::InvalidInput(format!(
            "{} is not a plain path inside the record",
            path.display()
        )))
    }
}

/// Undo log for a multi-file write: directories created and files touched, in order.
#[derive(Default)]
struct Rollback {
    created_dirs: Vec<PathBuf>,
    touched: Vec<(PathBuf, Option<String>)>,
}

impl Rollback {
    fn create_parents(&mut self, root: &Path, file: &Path) -> RecordResult<()> {
        let mut missing = Vec::new();
        let mut dir = file.parent();
        while let Some(d) = dir {
            if d == root || d.exists() {
                break;
            }
            missing.push(d.to_path_buf());
            dir = d.parent();
        }
        for d in missing.into_iter().rev() {
            std::fs::create_dir(&d).map_err(RecordError::FileWrite)?;
            self.created_dirs.push(d);
        }
        Ok(())
    }

    fn write(&mut self, path: PathBuf, file: &FileToWrite) -> RecordResult<()> {
        std::fs::write(&path, file.content).map_err(RecordError::FileWrite)?;
        self.touched.push((path, file.old_content.map(str::to_owned)));
        Ok(())
    }

    /// Best effort; the original error is what the caller reports.
    fn undo(self) {
        for (path, previous) in self.touched.into_iter().rev() {
            let _ = match previous {
                Some(content) => std::fs::write(&path, content),
                None => std::fs::remove_file(&path),
            };
        }
        for dir in self.created_dirs.into_iter().rev() {
            let _ = std::fs::remove_dir(dir);
        }
    }
}

/// Handle on one patient repository.
pub(crate) struct VersionedFileService {
    repo: git2::Repository,
    workdir: PathBuf,
}

impl VersionedFileService {
    fn wrap(
        repo: git2::Repository,
        err: fn(git2::Error) -> RecordError,
    ) -> RecordResult<Self> {
        // git2 may canonicalise the path, so later joins use its view of the workdir.
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| err(git2::Error::from_str("repository is bare")))?;
        Ok(Self { repo, workdir })
    }

    pub(crate) fn init(workdir: &Path) -> RecordResult<Self> {
        let repo = git2::Repository::init(workdir).map_err(RecordError::GitInit)?;
        Self::wrap(repo, RecordError::GitInit)
    }

    /// Open the repository at exactly `workdir`, never a parent.
    pub(crate) fn open(workdir: &Path) -> RecordResult<Self> {
        let repo = git2::Repository::open_ext(
            workdir,
            git2::RepositoryOpenFlags::NO_SEARCH,
            std::iter::empty::<&std::ffi::OsStr>(),
        )
        .map_err(RecordError::GitOpen)?;
        Self::wrap(repo, RecordError::GitOpen)
    }

    fn commit(
        &self,
        author: &Author,
        message: &CommitMessage,
        paths: &[&Path],
    ) -> RecordResult<git2::Oid> {
        let rendered = message.render_with_author(author)?;
        self.repo.set_head(MAIN_REF).map_err(RecordError::GitSetHead)?;

        let mut index = self.repo.index().map_err(RecordError::GitIndex)?;
        for path in paths {
            index.add_path(path).map_err(RecordError::GitAdd)?;
        }
        index.write().map_err(RecordError::GitIndex)?;

        self.commit_from_index(author, &rendered, &mut index)
    }

    /// Write `files` and commit them together.
    ///
    /// Paths are checked before anything touches the disk. If a write or the commit fails,
    /// previous contents are restored, new files removed and new directories removed.
    pub(crate) fn write_and_commit_files(
        repo_path: &Path,
        author: &Author,
        msg: &CommitMessage,
        files: &[FileToWrite],
    ) -> RecordResult<()> {
        for file in files {
            check_relative(file.relative_path)?;
        }
        let repo = Self::open(repo_path)?;

        let mut rollback = Rollback::default();
        let outcome = files
            .iter()
            .try_for_each(|file| {
                let target = repo.workdir.join(file.relative_path);
                rollback.create_parents(&repo.workdir, &target)?;
                rollback.write(target, file)
            })
            .and_then(|()| {
                let paths: Vec<&Path> = files.iter().map(|f| f.relative_path).collect();
                repo.commit(author, msg, &paths).map(|_| ())
            });

        if outcome.is_err() {
            rollback.undo();
        }
        outcome
    }

    /// Create the repository at `record_dir` with its first commit. On failure the whole
    /// directory is removed.
    pub(crate) fn init_and_commit(
        record_dir: &Path,
        author: &Author,
        message: &CommitMessage,
        files: &[FileToWrite],
    ) -> RecordResult<()> {
        let outcome = Self::init(record_dir)
            .and_then(|_| Self::write_and_commit_files(record_dir, author, message, files));
        let Err(error) = outcome else {
            return Ok(());
        };

        match cleanup_record_dir(record_dir) {
            Ok(()) => Err(error),
            Err(cleanup_error) => Err(RecordError::CleanupAfterInitialiseFailed {
                path: record_dir.to_path_buf(),
                init_error: Box::new(error),
                cleanup_error,
            }),
        }
    }

    fn commit_from_index(
        &self,
        author: &Author,
        message: &str,
        index: &mut git2::Index,
    ) -> RecordResult<git2::Oid> {
        let tree_id = index.write_tree().map_err(RecordError::GitWriteTree)?;
        let tree = self
            .repo
            .find_tree(tree_id)
            .map_err(RecordError::GitFindTree)?;

        let sig = git2::Signature::now(author.name.as_str(), author.email.as_str())
            .map_err(RecordError::GitSignature)?;

        let parents = self.resolve_head_parents()?;
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .map_err(RecordError::GitCommit)
    }

    /// Parent list for the next commit: HEAD's commit, or none for an unborn branch.
    fn resolve_head_parents(&self) -> RecordResult<Vec<git2::Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit().map_err(RecordError::GitPeel)?;
                Ok(vec![commit])
            }
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(vec![]),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(vec![]),
            Err(e) => Err(RecordError::GitHead(e)),
        }
    }

    /// Subject lines of the history, newest first.
    #[cfg(test)]
    pub(crate) fn history_subjects(&self) -> RecordResult<Vec<String>> {
        let mut walk = self.repo.revwalk().map_err(RecordError::GitHead)?;
        match walk.push_head() {
            Ok(()) => {}
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(vec![]),
            Err(e) => return Err(RecordError::GitHead(e)),
        }
        let mut subjects = Vec::new();
        for oid in walk {
            let oid = oid.map_err(RecordError::GitHead)?;
            let commit = self.repo.find_commit(oid).map_err(RecordError::GitPeel)?;
            subjects.push(commit.summary().unwrap_or_default().to_string());
        }
        Ok(subjects)
    }
}

#[cfg(test)]
static FORCE_CLEANUP_ERROR_FOR_THREADS: LazyLock<Mutex<HashSet<std::thread::ThreadId>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn cleanup_record_dir(record_dir: &Path) -> std::io::Result<()> {
    #[cfg(test)]
    {
        let current_id = std::thread::current().id();
        let mut guard = FORCE_CLEANUP_ERROR_FOR_THREADS
            .lock()
            .expect("FORCE_CLEANUP_ERROR_FOR_THREADS mutex poisoned");

        if guard.remove(&current_id) {
            return Err(std::io::Error::other("forced cleanup failure (test hook)"));
        }
    }

    std::fs::remove_dir_all(record_dir)
}

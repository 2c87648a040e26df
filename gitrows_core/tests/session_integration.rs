mod common;

use common::{hex, Fixture};
use gitrows_core::{
    CommitScope, Error, FetchMode, FilterError, Result, Session, SessionConfig, Source,
};
use serde_json::Value;
use tempfile::TempDir;

fn two_commit_fixture() -> (Fixture, String, String) {
    let mut fixture = Fixture::new();
    fixture.write("README.md", "hello\n");
    let first = hex(fixture.commit("first"));
    fixture.write("README.md", "hello\nagain\n");
    let second = hex(fixture.commit("second"));
    (fixture, first, second)
}

#[test]
fn release_removes_the_working_copy() -> Result<()> {
    let (fixture, _, _) = two_commit_fixture();
    let session = Session::acquire(fixture.path(), SessionConfig::default())?;
    let clone = session.path().to_path_buf();
    assert!(clone.exists());
    assert_eq!(session.source(), &Source::Local(fixture.path_buf()));
    assert_eq!(session.mode(), FetchMode::WithBlobs);

    session.release()?;
    assert!(!clone.exists());
    assert!(clone.parent().is_some_and(|workdir| !workdir.exists()));
    Ok(())
}

#[test]
fn dropping_a_session_removes_the_working_copy() -> Result<()> {
    let (fixture, _, _) = two_commit_fixture();
    let session = Session::acquire(fixture.path(), SessionConfig::default())?;
    let clone = session.path().to_path_buf();
    drop(session);
    assert!(!clone.exists());
    Ok(())
}

/// A git that streams `log` output normally and then exits with status 3.
#[cfg(unix)]
fn failing_log_git(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("git");
    std::fs::write(
        &script,
        "#!/bin/sh\nfor arg in \"$@\"; do\n  if [ \"$arg\" = log ]; then\n    git \"$@\"\n    exit 3\n  fi\ndone\nexec git \"$@\"\n",
    )
    .expect("write wrapper");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("chmod wrapper");
    script
}

#[cfg(unix)]
#[test]
fn failed_extraction_still_releases_the_working_copy() -> Result<()> {
    let (mut fixture, _, _) = two_commit_fixture();
    fixture.write("README.md", "hello\nagain\nand again\n");
    fixture.commit("third");

    let bin = TempDir::new().expect("tempdir");
    let config = SessionConfig::default()
        .with_commit_scope(CommitScope::AllRefs)
        .with_git_binary(failing_log_git(bin.path()));
    let session = Session::acquire(fixture.path(), config)?;
    let clone = session.path().to_path_buf();

    let results: Vec<_> = session.commits().iter()?.collect();
    assert!(results.first().is_some_and(Result::is_ok));
    let error = results
        .last()
        .and_then(|result| result.as_ref().err())
        .expect("extraction fails once git exits");
    assert!(
        matches!(error, Error::ToolInvocation { code: Some(3), .. }),
        "unexpected error: {error:?}"
    );
    assert!(clone.exists());

    session.release()?;
    assert!(!clone.exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn dropping_a_session_after_a_failed_extraction_removes_the_working_copy() -> Result<()> {
    let (fixture, _, _) = two_commit_fixture();
    let bin = TempDir::new().expect("tempdir");
    let config = SessionConfig::default().with_git_binary(failing_log_git(bin.path()));
    let session = Session::acquire(fixture.path(), config)?;
    let clone = session.path().to_path_buf();

    assert!(session.diffs()?.collect().is_err());
    drop(session);
    assert!(!clone.exists());
    Ok(())
}

#[test]
fn sessions_are_independent() -> Result<()> {
    let (fixture, _, _) = two_commit_fixture();
    let first = Session::acquire(fixture.path(), SessionConfig::default())?;
    let second = Session::acquire(fixture.path(), SessionConfig::default())?;
    assert_ne!(first.path(), second.path());

    let kept = second.path().to_path_buf();
    first.release()?;
    assert!(kept.exists());
    assert_eq!(second.commits().collect()?.len(), 2);
    Ok(())
}

#[test]
fn missing_path_is_unreachable() {
    let scratch = TempDir::new().expect("tempdir");
    let error = Session::acquire(scratch.path().join("missing"), SessionConfig::default())
        .expect_err("missing path");
    assert!(
        matches!(error, Error::SourceUnreachable { .. }),
        "unexpected error: {error:?}"
    );
}

#[test]
fn plain_directory_is_not_a_repository() {
    let scratch = TempDir::new().expect("tempdir");
    std::fs::write(scratch.path().join("notes.txt"), "not a repo").expect("write");
    let error =
        Session::acquire(scratch.path(), SessionConfig::default()).expect_err("plain directory");
    assert!(
        matches!(error, Error::NotARepository { .. }),
        "unexpected error: {error:?}"
    );
}

#[test]
fn unknown_remote_is_unreachable() {
    let scratch = TempDir::new().expect("tempdir");
    let url = format!("file://{}/nowhere.git", scratch.path().display());
    let error = Session::acquire(url.as_str(), SessionConfig::default()).expect_err("bad remote");
    assert!(
        matches!(
            error,
            Error::SourceUnreachable { .. } | Error::NotARepository { .. }
        ),
        "unexpected error: {error:?}"
    );
}

#[test]
fn missing_git_binary_fails_to_spawn() {
    let (fixture, _, _) = two_commit_fixture();
    let config = SessionConfig::default().with_git_binary("/nonexistent/bin/git");
    let error = Session::acquire(fixture.path(), config).expect_err("missing binary");
    assert!(
        matches!(error, Error::Spawn { .. }),
        "unexpected error: {error:?}"
    );
}

#[test]
fn metadata_only_sessions_refuse_content() -> Result<()> {
    let (fixture, first, second) = two_commit_fixture();
    let session = Session::acquire(fixture.path(), SessionConfig::metadata_only())?;
    assert_eq!(session.mode(), FetchMode::MetadataOnly);

    let commits = session.commits().collect()?;
    assert_eq!(commits.len(), 2);
    for commit in &commits {
        assert_eq!(commit.stats, None);
        assert_eq!(
            commit.files_changed(),
            Err(FilterError::new("files_changed"))
        );
        assert!(commit.lines_added().is_err());
    }

    let rows = session.commits().collect_rows()?;
    assert_eq!(rows[0].get("files_changed"), Some(&Value::Null));
    assert_eq!(rows[0].get("lines_added"), Some(&Value::Null));

    assert!(matches!(session.file_mods(), Err(Error::Filter(_))));
    assert!(matches!(session.diffs(), Err(Error::Filter(_))));
    assert!(matches!(
        session.diff_between(&first, &second),
        Err(Error::Filter(_))
    ));

    assert_eq!(session.branches().collect()?.len(), 1);
    Ok(())
}

#[test]
fn branches_flag_exactly_one_default() -> Result<()> {
    let (fixture, first, second) = two_commit_fixture();
    fixture.branch("feature", fixture.repo().revparse_single(&first).expect("rev").id());

    let session = Session::acquire(fixture.path(), SessionConfig::default())?;
    let branches = session.branches().collect()?;
    assert_eq!(branches.len(), 2);
    assert_eq!(branches.iter().filter(|branch| branch.is_default).count(), 1);

    let default = session.default_branch()?.expect("default branch");
    assert_eq!(default.name, "main");
    assert_eq!(default.tip, second);

    let feature = branches
        .iter()
        .find(|branch| branch.name == "feature")
        .expect("feature branch");
    assert_eq!(feature.tip, first);
    assert!(!feature.is_default);
    Ok(())
}

#[test]
fn tags_distinguish_lightweight_and_annotated() -> Result<()> {
    let (mut fixture, first, second) = two_commit_fixture();
    let first_oid = fixture.repo().revparse_single(&first).expect("rev").id();
    let second_oid = fixture.repo().revparse_single(&second).expect("rev").id();
    fixture.tag_lightweight("v1", first_oid);
    let tag_object = hex(fixture.tag_annotated("v2", second_oid, "Release two\n"));

    let session = Session::acquire(fixture.path(), SessionConfig::default())?;
    let tags = session.tags().collect()?;
    assert_eq!(tags.len(), 2);

    let v1 = tags.iter().find(|tag| tag.name == "v1").expect("v1");
    assert!(!v1.is_annotated());
    assert_eq!(v1.target, first);
    assert_eq!(v1.annotation, None);

    let v2 = tags.iter().find(|tag| tag.name == "v2").expect("v2");
    assert!(v2.is_annotated());
    assert_eq!(v2.target, second);
    assert_eq!(v2.tag_object.as_deref(), Some(tag_object.as_str()));
    assert_eq!(v2.annotation.as_deref(), Some("Release two"));
    Ok(())
}

#[test]
fn empty_repository_yields_empty_sequences() -> Result<()> {
    let fixture = Fixture::new();
    let session = Session::acquire(fixture.path(), SessionConfig::default())?;

    assert!(session.commits().collect()?.is_empty());
    assert!(session.branches().collect()?.is_empty());
    assert!(session.tags().collect()?.is_empty());
    assert!(session.file_mods()?.collect()?.is_empty());
    assert!(session.diffs()?.collect()?.is_empty());
    assert_eq!(session.default_branch()?, None);
    Ok(())
}

#[test]
fn unknown_revisions_fail_pair_diffs() -> Result<()> {
    let (fixture, first, _) = two_commit_fixture();
    let session = Session::acquire(fixture.path(), SessionConfig::default())?;
    let error = session
        .diff_between(&first, "no-such-branch")
        .expect_err("unknown revision");
    assert!(matches!(error, Error::Git { .. }), "unexpected error: {error:?}");
    Ok(())
}

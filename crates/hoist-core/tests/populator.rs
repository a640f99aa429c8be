mod support;

use std::fs;

use tempfile::TempDir;

use hoist_core::collab::populator::DEFAULT_BRANCH;
use hoist_core::collab::{GitPopulator, RepositoryPopulator};
use hoist_core::types::UserIdentity;

use support::git::git;

fn bare_remote(temp: &TempDir) -> String {
    let remote = temp.path().join("remote.git");
    fs::create_dir_all(&remote).unwrap();
    git(&remote, &["init", "--bare", "--quiet"]);
    remote.to_string_lossy().into_owned()
}

#[tokio::test]
async fn folder_content_lands_on_the_default_branch() {
    let temp = TempDir::new().unwrap();
    let remote = bare_remote(&temp);
    let folder = temp.path().join("shop");
    fs::create_dir_all(folder.join("src")).unwrap();
    fs::write(folder.join("src").join("main.txt"), "hello").unwrap();

    let populator = GitPopulator;
    assert!(!populator.is_versioned(&folder));

    let user = UserIdentity {
        name: "Dev".to_string(),
        email: "dev@example.com".to_string(),
    };
    populator.populate(&remote, &folder, Some(&user)).await.unwrap();

    let remote_dir = temp.path().join("remote.git");
    let author = git(&remote_dir, &["log", "-1", "--format=%an <%ae>", DEFAULT_BRANCH]);
    assert_eq!(author, "Dev <dev@example.com>");
    let files = git(&remote_dir, &["ls-tree", "-r", "--name-only", DEFAULT_BRANCH]);
    assert_eq!(files, "src/main.txt");
    assert!(populator.is_versioned(&folder));
}

#[tokio::test]
async fn repeated_push_only_adds_new_changes() {
    let temp = TempDir::new().unwrap();
    let remote = bare_remote(&temp);
    let folder = temp.path().join("shop");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("a.txt"), "a").unwrap();

    let populator = GitPopulator;
    populator.populate(&remote, &folder, None).await.unwrap();
    // Nothing changed; the second push must not fail on an empty commit.
    populator.populate(&remote, &folder, None).await.unwrap();

    let remote_dir = temp.path().join("remote.git");
    let count = git(&remote_dir, &["rev-list", "--count", DEFAULT_BRANCH]);
    assert_eq!(count, "1");
    let author = git(&remote_dir, &["log", "-1", "--format=%an", DEFAULT_BRANCH]);
    assert_eq!(author, "hoist");

    fs::write(folder.join("b.txt"), "b").unwrap();
    populator.populate(&remote, &folder, None).await.unwrap();
    let count = git(&remote_dir, &["rev-list", "--count", DEFAULT_BRANCH]);
    assert_eq!(count, "2");
}

#[tokio::test]
async fn unreachable_remote_is_an_error() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("shop");
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("a.txt"), "a").unwrap();

    let missing = temp.path().join("missing.git");
    let err = GitPopulator
        .populate(&missing.to_string_lossy(), &folder, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("push"), "{err:#}");
}

mod support;

use hoist_core::checkpoint::Slot;
use hoist_core::naming::LOG_GROUP_NAME;
use hoist_core::platform::{CreateOutcome, CreateRequest, ResourceFactory};
use hoist_core::types::ResourceKind;

use support::{GENERIC_DESCRIPTOR, Harness, auth, request};

async fn existing_project(h: &Harness, name: &str) {
    h.platform
        .inner()
        .create(
            &auth(),
            CreateRequest::new(ResourceKind::Project, name, &h.compartment.id),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn taken_project_name_is_replaced() {
    let h = Harness::new().await;
    existing_project(&h, "shop").await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params().with_replacements(["shop-2"]));

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let doc = checkpoint.doc();
    assert_eq!(doc.project_name.as_deref(), Some("shop-2"));
    let project_id = doc.project.id().unwrap();
    let projects = h.resources(ResourceKind::Project).await;
    let created = projects.iter().find(|p| p.id == project_id).unwrap();
    assert_eq!(created.display_name, "shop-2");

    let repositories = h.resources(ResourceKind::ArtifactRepository).await;
    assert_eq!(repositories[0].display_name, "shop-2ArtifactRepository");
}

#[tokio::test]
async fn conflict_without_replacement_fails_the_run() {
    let h = Harness::new().await;
    existing_project(&h, "shop").await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;

    assert!(!outcome.success);
    let message = outcome.error.unwrap();
    assert!(message.contains("'shop' already exists"), "{message}");
    assert_eq!(checkpoint.doc().project, Slot::InProgress);
}

#[tokio::test]
async fn repeated_conflict_stops_after_allowed_renames() {
    let h = Harness::new().await;
    existing_project(&h, "shop").await;
    existing_project(&h, "shop-2").await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params().with_replacements(["shop-2", "shop-3"]));

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;

    assert!(!outcome.success);
    let message = outcome.error.unwrap();
    assert!(message.contains("'shop-2' already exists"), "{message}");
    assert_eq!(checkpoint.doc().project_name.as_deref(), Some("shop-2"));
    drop(checkpoint);

    // The accepted replacement sticks; a more lenient run carries on from it.
    let orch = h
        .orchestrator(h.params().with_replacements(["shop-3"]))
        .with_name_conflict_retries(2);
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(checkpoint.doc().project_name.as_deref(), Some("shop-3"));
}

#[tokio::test]
async fn taken_log_name_gets_the_next_free_number() {
    let h = Harness::new().await;
    let platform = h.platform.inner();
    let log_group = match platform
        .create(
            &auth(),
            CreateRequest::new(ResourceKind::LogGroup, LOG_GROUP_NAME, &h.compartment.id),
        )
        .await
        .unwrap()
    {
        CreateOutcome::Resource(created) => created.id,
        CreateOutcome::Pending { .. } => panic!("log groups are created synchronously"),
    };
    let CreateOutcome::Pending { handle } = platform
        .create(
            &auth(),
            CreateRequest::new(ResourceKind::Log, "shopLog", &log_group),
        )
        .await
        .unwrap()
    else {
        panic!("logs are created through work requests");
    };
    platform.wait_for_work_request(&auth(), &handle).await.unwrap();

    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let doc = checkpoint.doc();
    assert_eq!(doc.log_group.id(), Some(log_group.as_str()));
    let log_id = doc.project_log_id.clone().unwrap();
    let logs = h.resources(ResourceKind::Log).await;
    let project_log = logs.iter().find(|l| l.id == log_id).unwrap();
    assert_eq!(project_log.display_name, "shopLog1");
    // One refused attempt under the taken name, one under the derived name.
    assert_eq!(h.platform.creates(ResourceKind::Log), 2);
}

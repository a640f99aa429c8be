mod support;

use std::sync::Arc;

use hoist_core::checkpoint::{ProjectField, RunStatus, Slot, SlotKey, SlotRef};
use hoist_core::collab::FileServicesWriter;
use hoist_core::deploy::CancelFlag;
use hoist_core::error::PlatformError;
use hoist_core::progress::ChannelSink;
use hoist_core::types::{Flavor, ResourceKind};

use support::{GENERIC_DESCRIPTOR, Harness, MULTI_MODULE_DESCRIPTOR, Script, request};

fn code_repository(folder: &str) -> SlotRef {
    SlotRef::CodeRepository {
        folder: folder.to_string(),
    }
}

#[tokio::test]
async fn completed_run_records_every_resource() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    let mut checkpoint = h.checkpoint("ws");

    let outcome = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let doc = checkpoint.doc();
    assert_eq!(doc.status, RunStatus::Completed);
    assert_eq!(doc.project_name.as_deref(), Some("shop"));
    assert_eq!(doc.compartment.as_ref(), Some(&h.compartment));
    assert!(doc.project.id().is_some());
    assert!(doc.project_log_id.is_some());
    assert!(doc.knowledge_base_id.is_some());
    assert!(doc.tag.is_some());

    let shop = doc.folder("shop").unwrap();
    assert!(shop.populated);
    assert!(shop.code_repository.id().is_some());
    assert!(shop.manifest_artifact.id().is_some());
    for key in [
        SlotKey::BuildArtifact(Flavor::Jvm),
        SlotKey::BuildPipeline(Flavor::Jvm),
        SlotKey::BuildStage(Flavor::Jvm),
        SlotKey::ArtifactsStage(Flavor::Jvm),
        SlotKey::ContainerRepository(Flavor::Jvm),
        SlotKey::ContainerPipeline(Flavor::Jvm),
    ] {
        assert!(shop.resources.get(key).id().is_some(), "{key} not recorded");
    }
    assert!(shop.resources.get(SlotKey::BuildPipeline(Flavor::Native)).is_not_attempted());
    assert!(shop.resources.get(SlotKey::DeployPipeline(Flavor::Jvm)).is_not_attempted());

    assert_eq!(h.populator.pushes().len(), 1);
    assert!(h.platform.inner().has_policies(&h.compartment.id).await);
    let services = FileServicesWriter::load(&folder).unwrap().unwrap();
    assert_eq!(services.project_id, doc.project.id().unwrap());
    assert_eq!(services.build_pipelines.len(), 2);
    assert!(services.deployment_pipelines.is_empty());
}

#[tokio::test]
async fn rerunning_a_completed_deployment_creates_nothing() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());

    let mut checkpoint = h.checkpoint("ws");
    let first = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(first.success, "{:?}", first.error);
    let recorded = checkpoint.doc().recorded_slots();
    drop(checkpoint);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let second = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(second.success, "{:?}", second.error);

    assert_eq!(h.platform.total_creates(), 0);
    assert_eq!(h.populator.pushes().len(), 1);
    assert_eq!(checkpoint.doc().recorded_slots(), recorded);
}

#[tokio::test]
async fn resource_created_before_an_interruption_is_adopted() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    h.platform
        .script(ResourceKind::CodeRepository, Script::HangAfterCreate);

    {
        let mut checkpoint = h.checkpoint("ws");
        let req = request(vec![folder.clone()]);
        tokio::select! {
            _ = orch.run(&req, &mut checkpoint) => panic!("run should hang on the code repository"),
            _ = h.platform.hung() => {}
        }
    }

    let stored = h.store("ws").load().unwrap().unwrap();
    assert_eq!(stored.slot(&code_repository("shop")), Slot::InProgress);
    let repositories = h.resources(ResourceKind::CodeRepository).await;
    assert_eq!(repositories.len(), 1);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    assert_eq!(h.platform.creates(ResourceKind::CodeRepository), 0);
    assert_eq!(h.resources(ResourceKind::CodeRepository).await.len(), 1);
    assert_eq!(
        checkpoint.slot(&code_repository("shop")),
        Slot::created(repositories[0].id.clone())
    );
    assert_eq!(h.populator.pushes().len(), 1);
}

#[tokio::test]
async fn creation_that_never_happened_is_issued_again() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    h.platform
        .script(ResourceKind::CodeRepository, Script::HangBeforeCreate);

    {
        let mut checkpoint = h.checkpoint("ws");
        let req = request(vec![folder.clone()]);
        tokio::select! {
            _ = orch.run(&req, &mut checkpoint) => panic!("run should hang on the code repository"),
            _ = h.platform.hung() => {}
        }
    }
    assert!(h.resources(ResourceKind::CodeRepository).await.is_empty());

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    assert_eq!(h.platform.creates(ResourceKind::CodeRepository), 1);
    assert_eq!(h.platform.creates(ResourceKind::Project), 0);
    assert_eq!(h.resources(ResourceKind::CodeRepository).await.len(), 1);
}

#[tokio::test]
async fn failed_step_is_retried_by_the_next_run() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    h.platform.script(
        ResourceKind::BuildPipeline,
        Script::Fail(PlatformError::Unavailable("service busy".to_string())),
    );

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(!outcome.success);
    let message = outcome.error.unwrap();
    assert!(message.contains("Failed to create build pipeline"), "{message}");
    assert!(message.contains("service busy"), "{message}");

    let stored = h.store("ws").load().unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    let pipeline = SlotRef::scoped("shop", None, SlotKey::BuildPipeline(Flavor::Jvm));
    assert_eq!(stored.slot(&pipeline), Slot::InProgress);
    drop(checkpoint);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(h.platform.creates(ResourceKind::BuildPipeline), 2);
    assert_eq!(h.platform.creates(ResourceKind::CodeRepository), 0);
    assert!(checkpoint.slot(&pipeline).id().is_some());
}

#[tokio::test]
async fn failed_push_keeps_the_repository_and_pushes_on_resume() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    h.populator.fail_next(1);

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("Failed to push shop"));
    assert!(!checkpoint.doc().folder("shop").unwrap().populated);
    drop(checkpoint);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(h.platform.creates(ResourceKind::CodeRepository), 0);
    assert_eq!(h.populator.pushes().len(), 1);
    assert!(checkpoint.doc().folder("shop").unwrap().populated);
}

#[tokio::test]
async fn cancelled_run_creates_nothing() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let cancel = CancelFlag::new();
    cancel.cancel();
    let orch = h.orchestrator(h.params()).with_cancel_flag(cancel);

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Deployment cancelled"));
    assert_eq!(h.platform.total_creates(), 0);
    assert_eq!(checkpoint.doc().status, RunStatus::Failed);
}

#[tokio::test]
async fn already_versioned_folder_is_refused() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    std::fs::create_dir_all(folder.join(".git")).unwrap();
    let orch = h.orchestrator(h.params());

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;

    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("already a git repository"));
    assert_eq!(h.platform.total_creates(), 0);
}

#[tokio::test]
async fn folder_without_build_command_fails_before_provisioning() {
    let h = Harness::new().await;
    let folder = h.folder("docs", "type = \"generic\"\n");
    let orch = h.orchestrator(h.params());

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;

    assert!(!outcome.success);
    assert!(
        outcome
            .error
            .unwrap()
            .contains("has no resolvable build command")
    );
    assert_eq!(h.platform.total_creates(), 0);
}

#[tokio::test]
async fn failed_knowledge_base_surfaces_at_the_join_and_is_adopted_later() {
    let h = Harness::new().await;
    let folder = h.folder("shop", GENERIC_DESCRIPTOR);
    let orch = h.orchestrator(h.params());
    h.platform.fail_wait(
        ResourceKind::KnowledgeBase,
        PlatformError::WorkRequestFailed {
            handle: "wr-kb".to_string(),
            reason: "quota".to_string(),
        },
    );

    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(!outcome.success);
    let message = outcome.error.unwrap();
    assert_eq!(
        message,
        "Creation of knowledge base did not complete: work request wr-kb failed: quota"
    );

    let stored = h.store("ws").load().unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(
        stored.slot(&SlotRef::Project(ProjectField::KnowledgeBase)),
        Slot::InProgress
    );
    assert!(stored.knowledge_base_id.is_none());
    // The push happens before the services config waits on the knowledge base.
    assert!(stored.folder("shop").unwrap().populated);
    drop(checkpoint);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let outcome = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(outcome.success, "{:?}", outcome.error);

    assert_eq!(h.platform.creates(ResourceKind::KnowledgeBase), 0);
    let bases = h.resources(ResourceKind::KnowledgeBase).await;
    assert_eq!(bases.len(), 1);
    assert_eq!(checkpoint.doc().knowledge_base_id.as_deref(), Some(bases[0].id.as_str()));
    assert_eq!(checkpoint.doc().status, RunStatus::Completed);
}

#[tokio::test]
async fn multi_module_folder_deploys_every_submodule_to_the_cluster() {
    let h = Harness::new().await;
    let folder = h.folder("fleet", MULTI_MODULE_DESCRIPTOR);
    let (sink, mut rx) = ChannelSink::channel();
    let orch = h
        .orchestrator(h.cluster_params().await)
        .with_progress(Arc::new(sink));

    let mut checkpoint = h.checkpoint("ws");
    let first = orch.run(&request(vec![folder.clone()]), &mut checkpoint).await;
    assert!(first.success, "{:?}", first.error);

    let mut progress = 0.0;
    while let Ok(event) = rx.try_recv() {
        progress += event.increment;
    }
    assert!((progress - 100.0).abs() < 1e-9, "{progress}");

    assert_eq!(h.resources(ResourceKind::ClusterEnvironment).await.len(), 1);
    // Two submodules, two flavors each, three stages per deployment pipeline.
    assert_eq!(h.resources(ResourceKind::DeployPipeline).await.len(), 4);
    assert_eq!(h.resources(ResourceKind::DeployStage).await.len(), 12);
    for sub in ["oci", "aws"] {
        for flavor in [Flavor::Jvm, Flavor::Native] {
            for key in [
                SlotKey::ContainerPipeline(flavor),
                SlotKey::DeployPipeline(flavor),
                SlotKey::DeployStage(flavor),
            ] {
                let slot = SlotRef::scoped("fleet", Some(sub), key);
                assert!(checkpoint.slot(&slot).id().is_some(), "{slot} not recorded");
            }
        }
    }
    let services = FileServicesWriter::load(&folder).unwrap().unwrap();
    assert_eq!(services.deployment_pipelines.len(), 4);
    drop(checkpoint);

    h.platform.reset_counts();
    let mut checkpoint = h.checkpoint("ws");
    let second = orch.run(&request(vec![folder]), &mut checkpoint).await;
    assert!(second.success, "{:?}", second.error);
    assert_eq!(h.platform.total_creates(), 0);
    assert_eq!(h.resources(ResourceKind::DeployStage).await.len(), 12);
}

use hoist_core::collab::{Classification, ProjectType};
use hoist_core::error::DeployError;
use hoist_core::plan::{
    ADOPTED_PROJECT_WEIGHT, FeatureFlags, ProjectMode, StepKind, assemble, build_flavors,
};
use hoist_core::types::Flavor;

fn generic() -> Classification {
    Classification {
        project_type: ProjectType::Generic,
        build_command: Some("make build".to_string()),
        artifact_location: Some("out/app.jar".to_string()),
        ..Classification::default()
    }
}

fn framework() -> Classification {
    Classification {
        project_type: ProjectType::Framework,
        build_command: Some("./gradlew build".to_string()),
        artifact_location: Some("build/libs/app-all.jar".to_string()),
        native_build_command: Some("./gradlew nativeCompile".to_string()),
        native_artifact_location: Some("build/native/nativeCompile/app".to_string()),
        ..Classification::default()
    }
}

fn multi_module() -> Classification {
    Classification {
        project_type: ProjectType::MultiModule,
        submodules: vec!["oci".to_string(), "aws".to_string()],
        ..framework()
    }
}

#[test]
fn generic_folder_without_cluster() {
    let plan = assemble(
        &ProjectMode::Fresh,
        FeatureFlags::default(),
        &[("shop".to_string(), generic())],
    )
    .unwrap();

    let kinds: Vec<StepKind> = plan.steps.iter().map(|s| s.kind).collect();
    let jvm = Flavor::Jvm;
    assert_eq!(
        kinds,
        vec![
            StepKind::NotificationTopic,
            StepKind::Project,
            StepKind::LogGroup,
            StepKind::ProjectLog,
            StepKind::AccessPolicies,
            StepKind::ArtifactRepository,
            StepKind::KnowledgeBase,
            StepKind::CodeRepository,
            StepKind::BuildSpec(jvm),
            StepKind::BuildArtifact(jvm),
            StepKind::BuildPipeline(jvm),
            StepKind::BuildStage(jvm),
            StepKind::ArtifactsStage(jvm),
            StepKind::ContainerRepository(jvm),
            StepKind::ContainerBuildSpec(jvm),
            StepKind::ContainerArtifact(jvm),
            StepKind::ContainerPipeline(jvm),
            StepKind::ContainerBuildStage(jvm),
            StepKind::ContainerArtifactsStage(jvm),
            StepKind::PopulateRepository,
            StepKind::SaveFolderManifest,
            StepKind::SaveServicesConfig,
            StepKind::SaveProjectManifest,
        ]
    );
    assert_eq!(plan.total_weight, plan.steps.len() as u32);
}

#[test]
fn bypassing_artifacts_drops_artifact_steps() {
    let flags = FeatureFlags {
        bypass_artifacts: true,
        ..FeatureFlags::default()
    };
    let plan = assemble(&ProjectMode::Fresh, flags, &[("shop".to_string(), generic())]).unwrap();

    let kinds = plan.kinds_for("shop");
    assert!(!kinds.contains(&StepKind::BuildArtifact(Flavor::Jvm)));
    assert!(!kinds.contains(&StepKind::ArtifactsStage(Flavor::Jvm)));
    assert!(kinds.contains(&StepKind::BuildStage(Flavor::Jvm)));
    assert!(kinds.contains(&StepKind::ContainerArtifact(Flavor::Jvm)));
}

#[test]
fn framework_folder_gets_native_chains_unless_disabled() {
    let folders = [("shop".to_string(), framework())];
    let plan = assemble(&ProjectMode::Fresh, FeatureFlags::default(), &folders).unwrap();
    assert!(plan.contains(StepKind::BuildPipeline(Flavor::Native)));
    assert!(plan.contains(StepKind::ContainerPipeline(Flavor::Native)));

    let flags = FeatureFlags {
        native_pipelines: false,
        ..FeatureFlags::default()
    };
    let plan = assemble(&ProjectMode::Fresh, flags, &folders).unwrap();
    assert!(!plan.contains(StepKind::BuildPipeline(Flavor::Native)));
    assert_eq!(build_flavors(&framework(), flags), vec![Flavor::Jvm]);
}

#[test]
fn cluster_adds_environment_and_deployment_chains() {
    let flags = FeatureFlags {
        cluster: true,
        ..FeatureFlags::default()
    };
    let plan = assemble(&ProjectMode::Fresh, flags, &[("shop".to_string(), generic())]).unwrap();

    let environment = plan
        .steps
        .iter()
        .position(|s| s.kind == StepKind::ClusterEnvironment)
        .unwrap();
    let knowledge_base = plan
        .steps
        .iter()
        .position(|s| s.kind == StepKind::KnowledgeBase)
        .unwrap();
    assert!(environment < knowledge_base);

    let kinds = plan.kinds_for("shop");
    for kind in [
        StepKind::SetupSecretSpec,
        StepKind::SetupSecretArtifact,
        StepKind::ConfigMapSpec,
        StepKind::ConfigMapArtifact,
        StepKind::DeployConfigSpec(Flavor::Jvm),
        StepKind::DeployConfigArtifact(Flavor::Jvm),
        StepKind::DeployPipeline(Flavor::Jvm),
        StepKind::SetupSecretStage(Flavor::Jvm),
        StepKind::ApplyConfigMapStage(Flavor::Jvm),
        StepKind::DeployStage(Flavor::Jvm),
    ] {
        assert!(kinds.contains(&kind), "missing {}", kind.describe());
    }
    assert_eq!(kinds.last(), Some(&StepKind::SaveServicesConfig));
}

#[test]
fn multi_module_images_are_built_per_submodule() {
    let flags = FeatureFlags {
        cluster: true,
        ..FeatureFlags::default()
    };
    let plan = assemble(&ProjectMode::Fresh, flags, &[("cloud".to_string(), multi_module())]).unwrap();

    let submodules_with_images: Vec<&str> = plan
        .steps
        .iter()
        .filter(|s| s.kind == StepKind::ContainerPipeline(Flavor::Jvm))
        .filter_map(|s| s.submodule.as_deref())
        .collect();
    assert_eq!(submodules_with_images, vec!["oci", "aws"]);

    let deploy_pipelines = plan
        .steps
        .iter()
        .filter(|s| matches!(s.kind, StepKind::DeployPipeline(_)))
        .count();
    assert_eq!(deploy_pipelines, 4);

    // Binaries are built once for the whole folder.
    let build_pipelines: Vec<_> = plan
        .steps
        .iter()
        .filter(|s| s.kind == StepKind::BuildPipeline(Flavor::Jvm))
        .collect();
    assert_eq!(build_pipelines.len(), 1);
    assert_eq!(build_pipelines[0].submodule, None);
}

#[test]
fn multi_module_without_submodules_is_rejected() {
    let classification = Classification {
        submodules: Vec::new(),
        ..multi_module()
    };
    let err = assemble(
        &ProjectMode::Fresh,
        FeatureFlags::default(),
        &[("cloud".to_string(), classification)],
    )
    .unwrap_err();
    assert!(err.to_string().contains("no deployable submodule"));
}

#[test]
fn incremental_plan_keeps_the_fresh_weight_of_the_project_prefix() {
    let folders = [("shop".to_string(), generic())];
    let fresh = assemble(&ProjectMode::Fresh, FeatureFlags::default(), &folders).unwrap();
    let incremental = assemble(
        &ProjectMode::Incremental {
            project_id: "p1".to_string(),
        },
        FeatureFlags::default(),
        &folders,
    )
    .unwrap();

    assert_eq!(incremental.steps[0].kind, StepKind::AdoptProject);
    assert_eq!(incremental.steps[0].weight, ADOPTED_PROJECT_WEIGHT);
    assert!(incremental.contains(StepKind::ResolveArtifactRepository));
    assert!(incremental.contains(StepKind::ResolveKnowledgeBase));
    assert!(!incremental.contains(StepKind::Project));
    assert_eq!(incremental.total_weight, fresh.total_weight);
}

#[test]
fn folder_without_build_path_or_no_folders_fails() {
    let err = assemble(
        &ProjectMode::Fresh,
        FeatureFlags::default(),
        &[("docs".to_string(), Classification::default())],
    )
    .unwrap_err();
    assert!(matches!(err, DeployError::Precondition(_)));
    assert!(err.to_string().contains("docs"));

    let err = assemble(&ProjectMode::Fresh, FeatureFlags::default(), &[]).unwrap_err();
    assert!(err.to_string().contains("No folders selected"));
}

#[test]
fn only_project_steps_run_outside_a_folder() {
    let flags = FeatureFlags {
        cluster: true,
        ..FeatureFlags::default()
    };
    let folders = [("fleet".to_string(), multi_module())];
    let incremental = ProjectMode::Incremental {
        project_id: "p1".to_string(),
    };
    for mode in [ProjectMode::Fresh, incremental] {
        let plan = assemble(&mode, flags, &folders).unwrap();
        for step in &plan.steps {
            assert_eq!(
                step.kind.is_project_level(),
                step.folder.is_none(),
                "{:?}",
                step.kind
            );
        }
    }
}

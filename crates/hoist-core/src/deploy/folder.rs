//! Folder-level steps: code repository, build and image pipelines, cluster
//! deployment, repository population and configuration persistence.

use tracing::{debug, warn};

use super::background::BackgroundKind;
use super::protocol::ConflictPolicy;
use super::runner::Run;
use crate::checkpoint::{SlotKey, SlotRef};
use crate::collab::populator::DEFAULT_BRANCH;
use crate::collab::services::{PipelineEntry, SERVICES_VERSION};
use crate::collab::templates::GENERATED_DIR;
use crate::collab::{BuiltinTemplates, Classification, ServicesConfig, TemplateValues};
use crate::error::{DeployError, Result};
use crate::naming;
use crate::platform::{CONTENT_PROPERTY, CreateRequest, ResourceUpdate};
use crate::plan::{Step, StepKind};
use crate::types::{Flavor, ResourceKind, TAG_CODE_REPO, TAG_INCOMPLETE};

/// Shape the build runner uses for every stage.
const BUILD_RUNNER_IMAGE: &str = "OL7_X86_64_STANDARD_10";

fn build_path(classification: &Classification, flavor: Flavor) -> Option<(String, String)> {
    let (command, location) = match flavor {
        Flavor::Jvm => (
            &classification.build_command,
            &classification.artifact_location,
        ),
        Flavor::Native => (
            &classification.native_build_command,
            &classification.native_artifact_location,
        ),
    };
    Some((command.clone()?, location.clone()?))
}

fn binary_output(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Jvm => "app_fatjar",
        Flavor::Native => "app_native_executable",
    }
}

fn image_output(flavor: Flavor) -> String {
    format!("{}_image", flavor.token())
}

fn dockerfile(flavor: Flavor) -> &'static str {
    match flavor {
        Flavor::Jvm => BuiltinTemplates::DOCKERFILE_JVM,
        Flavor::Native => BuiltinTemplates::DOCKERFILE_NATIVE,
    }
}

/// `<folder>` or `<folder>_<submodule>`, prefix of per-submodule names.
fn scope_name(folder: &str, submodule: Option<&str>) -> String {
    match submodule {
        Some(sub) => format!("{folder}_{sub}"),
        None => folder.to_string(),
    }
}

fn build_artifact_name(folder: &str, flavor: Flavor) -> String {
    match flavor {
        Flavor::Jvm => format!("{folder}_dev_fatjar"),
        Flavor::Native => format!("{folder}_dev_executable"),
    }
}

fn build_artifact_path(folder: &str, flavor: Flavor) -> String {
    match flavor {
        Flavor::Jvm => format!("{folder}-dev.jar"),
        Flavor::Native => format!("{folder}-dev"),
    }
}

fn build_pipeline_name(folder: &str, flavor: Flavor) -> String {
    format!("{folder}: Build {}", flavor.binary_label())
}

fn container_pipeline_name(folder: &str, submodule: Option<&str>, flavor: Flavor) -> String {
    match submodule {
        Some(sub) => format!("{folder}: Build {} image of {sub}", flavor.image_label()),
        None => format!("{folder}: Build {} image", flavor.image_label()),
    }
}

fn deploy_pipeline_name(folder: &str, submodule: Option<&str>, flavor: Flavor) -> String {
    match submodule {
        Some(sub) => format!("{folder}: Deploy {} of {sub} to cluster", flavor.image_label()),
        None => format!("{folder}: Deploy {} to cluster", flavor.image_label()),
    }
}

/// Display name of the pipeline recorded under `key`, if it is one.
fn pipeline_name(folder: &str, submodule: Option<&str>, key: SlotKey) -> Option<(bool, String)> {
    match key {
        SlotKey::BuildPipeline(flavor) => Some((true, build_pipeline_name(folder, flavor))),
        SlotKey::ContainerPipeline(flavor) => {
            Some((true, container_pipeline_name(folder, submodule, flavor)))
        }
        SlotKey::DeployPipeline(flavor) => {
            Some((false, deploy_pipeline_name(folder, submodule, flavor)))
        }
        _ => None,
    }
}

impl Run<'_> {
    pub(super) async fn folder_step(&mut self, step: &Step) -> Result<String> {
        let folder = step
            .folder
            .clone()
            .ok_or_else(|| DeployError::Precondition(format!("Step {step} has no folder")))?;
        let sub = step.submodule.as_deref();
        match step.kind {
            StepKind::CodeRepository => self.code_repository(step, &folder).await,
            StepKind::BuildSpec(flavor) => self.build_spec(step, &folder, flavor),
            StepKind::BuildArtifact(flavor) => self.build_artifact(step, &folder, flavor).await,
            StepKind::BuildPipeline(flavor) => self.build_pipeline(step, &folder, flavor).await,
            StepKind::BuildStage(flavor) => self.build_stage(step, &folder, flavor).await,
            StepKind::ArtifactsStage(flavor) => self.artifacts_stage(step, &folder, flavor).await,
            StepKind::ContainerRepository(flavor) => {
                self.container_repository(step, &folder, sub, flavor).await
            }
            StepKind::ContainerBuildSpec(flavor) => {
                self.container_build_spec(step, &folder, sub, flavor)
            }
            StepKind::ContainerArtifact(flavor) => {
                self.container_artifact(step, &folder, sub, flavor).await
            }
            StepKind::ContainerPipeline(flavor) => {
                self.container_pipeline(step, &folder, sub, flavor).await
            }
            StepKind::ContainerBuildStage(flavor) => {
                self.container_build_stage(step, &folder, sub, flavor).await
            }
            StepKind::ContainerArtifactsStage(flavor) => {
                self.container_artifacts_stage(step, &folder, sub, flavor).await
            }
            StepKind::SetupSecretSpec => self.setup_secret_spec(step, &folder),
            StepKind::SetupSecretArtifact => self.setup_secret_artifact(step, &folder).await,
            StepKind::ConfigMapSpec => self.config_map_spec(step, &folder, sub),
            StepKind::ConfigMapArtifact => self.config_map_artifact(step, &folder, sub).await,
            StepKind::DeployConfigSpec(flavor) => {
                self.deploy_config_spec(step, &folder, sub, flavor)
            }
            StepKind::DeployConfigArtifact(flavor) => {
                self.deploy_config_artifact(step, &folder, sub, flavor).await
            }
            StepKind::DeployPipeline(flavor) => {
                self.deploy_pipeline(step, &folder, sub, flavor).await
            }
            StepKind::SetupSecretStage(flavor) => {
                self.setup_secret_stage(step, &folder, sub, flavor).await
            }
            StepKind::ApplyConfigMapStage(flavor) => {
                self.apply_config_map_stage(step, &folder, sub, flavor).await
            }
            StepKind::DeployStage(flavor) => self.deploy_stage(step, &folder, sub, flavor).await,
            StepKind::PopulateRepository => self.populate_repository(step, &folder).await,
            StepKind::SaveFolderManifest => self.save_folder_manifest(step, &folder).await,
            StepKind::SaveServicesConfig => self.save_services_config(step, &folder).await,
            other => Err(DeployError::Precondition(format!(
                "{} is not a folder step",
                other.describe()
            ))),
        }
    }

    fn code_repository_id(&self, folder: &str) -> Result<String> {
        self.created_id(&SlotRef::CodeRepository {
            folder: folder.to_string(),
        })
    }

    fn slot_id(&self, folder: &str, sub: Option<&str>, key: SlotKey) -> Result<String> {
        self.created_id(&SlotRef::scoped(folder, sub, key))
    }

    /// Creation request for a folder resource, linked to its code repository.
    fn folder_request(
        &self,
        folder: &str,
        kind: ResourceKind,
        name: impl Into<String>,
        parent: impl Into<String>,
    ) -> Result<CreateRequest> {
        Ok(CreateRequest::new(kind, name, parent).tag(TAG_CODE_REPO, self.code_repository_id(folder)?))
    }

    async fn ensure_folder_resource(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        key: SlotKey,
        request: CreateRequest,
    ) -> Result<String> {
        let slot_ref = SlotRef::scoped(folder, sub, key);
        let resolved = self.ensure(&slot_ref, request, ConflictPolicy::Fail).await?;
        Ok(resolved.message(step))
    }

    fn expand(&self, template: &str, values: &TemplateValues) -> Result<String> {
        self.orch
            .collab
            .templates
            .expand(template, values)
            .map_err(|e| DeployError::collaborator(format!("Failed to expand {template}"), e))
    }

    fn write_generated(&self, folder: &str, file_name: &str, content: &str) -> Result<()> {
        let path = self.folder_run(folder)?.path.clone();
        let written = self
            .orch
            .collab
            .templates
            .write(&path, file_name, content)
            .map_err(|e| DeployError::collaborator(format!("Failed to write {file_name}"), e))?;
        debug!(target: "hoist::deploy", "Wrote {}", written.display());
        Ok(())
    }

    fn build_command_of(&self, folder: &str, flavor: Flavor) -> Result<(String, String)> {
        build_path(&self.folder_run(folder)?.classification, flavor).ok_or_else(|| {
            DeployError::Precondition(format!(
                "Folder {folder} has no {} build command and artifact location",
                flavor.binary_label()
            ))
        })
    }

    fn artifact_repository_id(&self) -> Result<String> {
        self.artifact_repository_id.clone().ok_or_else(|| {
            DeployError::Precondition("Artifact repository is not available".to_string())
        })
    }

    fn image_name(&self, folder: &str, sub: Option<&str>, flavor: Flavor) -> String {
        naming::image_name(
            &self.auth.region,
            &self.namespace,
            &naming::container_repository_name(folder, sub, flavor),
        )
    }

    fn app_name(folder: &str, sub: Option<&str>) -> String {
        naming::app_name(&scope_name(folder, sub))
    }

    fn inline_content(&self, folder: &str, sub: Option<&str>, spec: StepKind) -> Result<String> {
        self.folder_run(folder)?
            .inline
            .get(&(sub.map(str::to_string), spec))
            .cloned()
            .ok_or_else(|| {
                DeployError::Precondition(format!("{} was not generated", spec.describe()))
            })
    }

    fn keep_inline(&mut self, folder: &str, sub: Option<&str>, spec: StepKind, content: String) -> Result<()> {
        self.folder_run_mut(folder)?
            .inline
            .insert((sub.map(str::to_string), spec), content);
        Ok(())
    }

    async fn code_repository(&mut self, step: &Step, folder: &str) -> Result<String> {
        let slot_ref = SlotRef::CodeRepository {
            folder: folder.to_string(),
        };
        let request = CreateRequest::new(ResourceKind::CodeRepository, folder, self.project_id()?)
            .description(format!("Source code of {folder}"))
            .property("default_branch", DEFAULT_BRANCH)
            .tag(TAG_INCOMPLETE, "true");
        let resolved = self.ensure(&slot_ref, request, ConflictPolicy::Fail).await?;
        if !resolved.reused && self.checkpoint.doc().folder(folder).is_some_and(|f| f.populated) {
            self.checkpoint.doc_mut().folder_mut(folder).populated = false;
            self.checkpoint.persist()?;
        }
        self.folder_run_mut(folder)?.endpoint = resolved.endpoint.clone();
        Ok(resolved.message(step))
    }

    fn build_spec(&mut self, step: &Step, folder: &str, flavor: Flavor) -> Result<String> {
        let (command, location) = self.build_command_of(folder, flavor)?;
        let mut values = TemplateValues::new();
        values.insert("binary_label".into(), flavor.binary_label().into());
        values.insert("build_command".into(), command);
        values.insert("artifact_location".into(), location);
        let template = if self.flags.bypass_artifacts {
            values.insert("artifact_repository_id".into(), self.artifact_repository_id()?);
            values.insert("artifact_path".into(), build_artifact_path(folder, flavor));
            BuiltinTemplates::BUILD_SPEC_NO_OUTPUT_ARTIFACTS
        } else {
            values.insert("output_name".into(), binary_output(flavor).into());
            BuiltinTemplates::BUILD_SPEC
        };
        let content = self.expand(template, &values)?;
        let file = naming::spec_file_name(BuiltinTemplates::BUILD_SPEC, None, Some(flavor));
        self.write_generated(folder, &file, &content)?;
        Ok(format!("Generated {step}"))
    }

    async fn build_artifact(&mut self, step: &Step, folder: &str, flavor: Flavor) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployArtifact,
                build_artifact_name(folder, flavor),
                self.project_id()?,
            )?
            .description(format!("{} built from {folder}", flavor.binary_label()))
            .property("artifact_type", "GENERIC_FILE")
            .reference("repository_id", self.artifact_repository_id()?)
            .property("artifact_path", build_artifact_path(folder, flavor))
            .property("artifact_version", "${BUILDRUN_HASH}");
        self.ensure_folder_resource(step, folder, None, SlotKey::BuildArtifact(flavor), request)
            .await
    }

    async fn build_pipeline(&mut self, step: &Step, folder: &str, flavor: Flavor) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildPipeline,
                build_pipeline_name(folder, flavor),
                self.project_id()?,
            )?
            .description(format!("Builds the {} of {folder}", flavor.binary_label()));
        self.ensure_folder_resource(step, folder, None, SlotKey::BuildPipeline(flavor), request)
            .await
    }

    async fn build_stage(&mut self, step: &Step, folder: &str, flavor: Flavor) -> Result<String> {
        let pipeline_id = self.slot_id(folder, None, SlotKey::BuildPipeline(flavor))?;
        let spec = naming::spec_file_name(BuiltinTemplates::BUILD_SPEC, None, Some(flavor));
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildStage,
                format!("Build {}", flavor.binary_label()),
                pipeline_id.clone(),
            )?
            .property("stage_type", "BUILD")
            .reference("code_repository_id", self.code_repository_id(folder)?)
            .property("branch", DEFAULT_BRANCH)
            .property("build_spec_file", format!("{GENERATED_DIR}/{spec}"))
            .property("image", BUILD_RUNNER_IMAGE)
            .reference("predecessor_id", pipeline_id);
        self.ensure_folder_resource(step, folder, None, SlotKey::BuildStage(flavor), request)
            .await
    }

    async fn artifacts_stage(&mut self, step: &Step, folder: &str, flavor: Flavor) -> Result<String> {
        let pipeline_id = self.slot_id(folder, None, SlotKey::BuildPipeline(flavor))?;
        let build_stage_id = self.slot_id(folder, None, SlotKey::BuildStage(flavor))?;
        let artifact_id = self.slot_id(folder, None, SlotKey::BuildArtifact(flavor))?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildStage,
                format!("Upload {}", flavor.binary_label()),
                pipeline_id,
            )?
            .property("stage_type", "DELIVER_ARTIFACT")
            .reference("artifact_id", artifact_id)
            .property("output_name", binary_output(flavor))
            .reference("predecessor_id", build_stage_id);
        self.ensure_folder_resource(step, folder, None, SlotKey::ArtifactsStage(flavor), request)
            .await
    }

    async fn container_repository(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::ContainerRepository,
                naming::container_repository_name(folder, sub, flavor),
                self.compartment.id.clone(),
            )?
            .property("is_public", "false");
        self.ensure_folder_resource(step, folder, sub, SlotKey::ContainerRepository(flavor), request)
            .await
    }

    fn container_build_spec(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let (command, location) = self.build_command_of(folder, flavor)?;
        let docker_file = dockerfile(flavor);
        let mut values = TemplateValues::new();
        values.insert("image_label".into(), flavor.image_label().into());
        values.insert("build_command".into(), command);
        values.insert("docker_file".into(), format!("{GENERATED_DIR}/{docker_file}"));
        values.insert("image_name".into(), self.image_name(folder, sub, flavor));
        values.insert("artifact_location".into(), location);
        values.insert("output_name".into(), image_output(flavor));

        let content = self.expand(BuiltinTemplates::CONTAINER_BUILD_SPEC, &values)?;
        let file = naming::spec_file_name(BuiltinTemplates::CONTAINER_BUILD_SPEC, sub, Some(flavor));
        self.write_generated(folder, &file, &content)?;
        let dockerfile_content = self.expand(docker_file, &TemplateValues::new())?;
        self.write_generated(folder, docker_file, &dockerfile_content)?;
        Ok(format!("Generated {step}"))
    }

    async fn container_artifact(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployArtifact,
                format!("{}_{}_container_image", scope_name(folder, sub), flavor.token()),
                self.project_id()?,
            )?
            .property("artifact_type", "DOCKER_IMAGE")
            .property(
                "image_uri",
                format!("{}:${{DOCKER_TAG}}", self.image_name(folder, sub, flavor)),
            );
        self.ensure_folder_resource(step, folder, sub, SlotKey::ContainerArtifact(flavor), request)
            .await
    }

    async fn container_pipeline(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildPipeline,
                container_pipeline_name(folder, sub, flavor),
                self.project_id()?,
            )?
            .description(format!("Builds the {} image", flavor.image_label()));
        self.ensure_folder_resource(step, folder, sub, SlotKey::ContainerPipeline(flavor), request)
            .await
    }

    async fn container_build_stage(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let pipeline_id = self.slot_id(folder, sub, SlotKey::ContainerPipeline(flavor))?;
        let spec = naming::spec_file_name(BuiltinTemplates::CONTAINER_BUILD_SPEC, sub, Some(flavor));
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildStage,
                format!("Build {} image", flavor.image_label()),
                pipeline_id.clone(),
            )?
            .property("stage_type", "BUILD")
            .reference("code_repository_id", self.code_repository_id(folder)?)
            .property("branch", DEFAULT_BRANCH)
            .property("build_spec_file", format!("{GENERATED_DIR}/{spec}"))
            .property("image", BUILD_RUNNER_IMAGE)
            .reference("predecessor_id", pipeline_id);
        self.ensure_folder_resource(step, folder, sub, SlotKey::ContainerBuildStage(flavor), request)
            .await
    }

    async fn container_artifacts_stage(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let pipeline_id = self.slot_id(folder, sub, SlotKey::ContainerPipeline(flavor))?;
        let build_stage_id = self.slot_id(folder, sub, SlotKey::ContainerBuildStage(flavor))?;
        let artifact_id = self.slot_id(folder, sub, SlotKey::ContainerArtifact(flavor))?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::BuildStage,
                format!("Push {} image", flavor.image_label()),
                pipeline_id,
            )?
            .property("stage_type", "DELIVER_ARTIFACT")
            .reference("artifact_id", artifact_id)
            .property("output_name", image_output(flavor))
            .reference("predecessor_id", build_stage_id);
        self.ensure_folder_resource(
            step,
            folder,
            sub,
            SlotKey::ContainerArtifactsStage(flavor),
            request,
        )
        .await
    }

    /// Registry secret name, generated once per folder.
    fn secret_name(&mut self, folder: &str) -> Result<String> {
        if let Some(name) = self
            .checkpoint
            .doc()
            .folder(folder)
            .and_then(|f| f.secret_name.clone())
        {
            return Ok(name);
        }
        let name = naming::secret_name(folder);
        self.checkpoint.doc_mut().folder_mut(folder).secret_name = Some(name.clone());
        self.checkpoint.persist()?;
        Ok(name)
    }

    fn setup_secret_spec(&mut self, step: &Step, folder: &str) -> Result<String> {
        let cluster = self.cluster.clone().ok_or_else(|| {
            DeployError::Precondition("No target cluster selected".to_string())
        })?;
        let mut values = TemplateValues::new();
        values.insert("cluster_id".into(), cluster.id);
        values.insert("region".into(), self.auth.region.clone());
        values.insert("secret_name".into(), self.secret_name(folder)?);
        values.insert("repo_endpoint".into(), naming::registry_endpoint(&self.auth.region));
        values.insert("app_name".into(), Self::app_name(folder, None));
        let content = self.expand(BuiltinTemplates::SETUP_SECRET_COMMAND, &values)?;
        self.keep_inline(folder, None, StepKind::SetupSecretSpec, content)?;
        Ok(format!("Generated {step}"))
    }

    async fn setup_secret_artifact(&mut self, step: &Step, folder: &str) -> Result<String> {
        let content = self.inline_content(folder, None, StepKind::SetupSecretSpec)?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployArtifact,
                format!("{folder}_setup_secret_command"),
                self.project_id()?,
            )?
            .property("artifact_type", "COMMAND_SPEC")
            .property(CONTENT_PROPERTY, content);
        self.ensure_folder_resource(step, folder, None, SlotKey::SetupSecretArtifact, request)
            .await
    }

    fn config_map_spec(&mut self, step: &Step, folder: &str, sub: Option<&str>) -> Result<String> {
        let mut values = TemplateValues::new();
        values.insert("app_name".into(), Self::app_name(folder, sub));
        let content = self.expand(BuiltinTemplates::CONFIG_MAP, &values)?;
        self.keep_inline(folder, sub, StepKind::ConfigMapSpec, content)?;
        Ok(format!("Generated {step}"))
    }

    async fn config_map_artifact(&mut self, step: &Step, folder: &str, sub: Option<&str>) -> Result<String> {
        let content = self.inline_content(folder, sub, StepKind::ConfigMapSpec)?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployArtifact,
                format!("{}_config_map", scope_name(folder, sub)),
                self.project_id()?,
            )?
            .property("artifact_type", "KUBERNETES_MANIFEST")
            .property(CONTENT_PROPERTY, content);
        self.ensure_folder_resource(step, folder, sub, SlotKey::ConfigMapArtifact, request)
            .await
    }

    fn deploy_config_spec(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let mut values = TemplateValues::new();
        values.insert("app_name".into(), Self::app_name(folder, sub));
        values.insert("image_name".into(), self.image_name(folder, sub, flavor));
        values.insert("secret_name".into(), self.secret_name(folder)?);
        let content = self.expand(BuiltinTemplates::DEPLOY_CONFIG, &values)?;
        self.keep_inline(folder, sub, StepKind::DeployConfigSpec(flavor), content)?;
        Ok(format!("Generated {step}"))
    }

    async fn deploy_config_artifact(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let content = self.inline_content(folder, sub, StepKind::DeployConfigSpec(flavor))?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployArtifact,
                format!(
                    "{}_{}_deploy_configuration",
                    scope_name(folder, sub),
                    flavor.token()
                ),
                self.project_id()?,
            )?
            .property("artifact_type", "KUBERNETES_MANIFEST")
            .property(CONTENT_PROPERTY, content);
        self.ensure_folder_resource(step, folder, sub, SlotKey::DeployConfigArtifact(flavor), request)
            .await
    }

    fn cluster_environment_id(&self) -> Result<String> {
        self.cluster_environment_id.clone().ok_or_else(|| {
            DeployError::Precondition("Cluster environment is not available".to_string())
        })
    }

    async fn deploy_pipeline(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployPipeline,
                deploy_pipeline_name(folder, sub, flavor),
                self.project_id()?,
            )?
            .description(format!("Deploys the {} image to the cluster", flavor.image_label()));
        self.ensure_folder_resource(step, folder, sub, SlotKey::DeployPipeline(flavor), request)
            .await
    }

    async fn setup_secret_stage(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let pipeline_id = self.slot_id(folder, sub, SlotKey::DeployPipeline(flavor))?;
        let command_id = self.slot_id(folder, None, SlotKey::SetupSecretArtifact)?;
        let request = self
            .folder_request(
                folder,
                ResourceKind::DeployStage,
                "Setup registry secret",
                pipeline_id.clone(),
            )?
            .property("stage_type", "SHELL")
            .reference("command_spec_artifact_id", command_id)
            .reference("environment_id", self.cluster_environment_id()?)
            .reference("predecessor_id", pipeline_id);
        self.ensure_folder_resource(step, folder, sub, SlotKey::SetupSecretStage(flavor), request)
            .await
    }

    async fn apply_config_map_stage(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let pipeline_id = self.slot_id(folder, sub, SlotKey::DeployPipeline(flavor))?;
        let predecessor = self.slot_id(folder, sub, SlotKey::SetupSecretStage(flavor))?;
        let manifest_id = self.slot_id(folder, sub, SlotKey::ConfigMapArtifact)?;
        let request = self
            .folder_request(folder, ResourceKind::DeployStage, "Apply ConfigMap", pipeline_id)?
            .property("stage_type", "OKE_DEPLOYMENT")
            .reference("manifest_artifact_id", manifest_id)
            .reference("environment_id", self.cluster_environment_id()?)
            .reference("predecessor_id", predecessor);
        self.ensure_folder_resource(step, folder, sub, SlotKey::ApplyConfigMapStage(flavor), request)
            .await
    }

    async fn deploy_stage(
        &mut self,
        step: &Step,
        folder: &str,
        sub: Option<&str>,
        flavor: Flavor,
    ) -> Result<String> {
        let pipeline_id = self.slot_id(folder, sub, SlotKey::DeployPipeline(flavor))?;
        let predecessor = self.slot_id(folder, sub, SlotKey::ApplyConfigMapStage(flavor))?;
        let manifest_id = self.slot_id(folder, sub, SlotKey::DeployConfigArtifact(flavor))?;
        let request = self
            .folder_request(folder, ResourceKind::DeployStage, "Deploy to cluster", pipeline_id)?
            .property("stage_type", "OKE_DEPLOYMENT")
            .reference("manifest_artifact_id", manifest_id)
            .reference("environment_id", self.cluster_environment_id()?)
            .reference("predecessor_id", predecessor);
        self.ensure_folder_resource(step, folder, sub, SlotKey::DeployStage(flavor), request)
            .await
    }

    async fn populate_repository(&mut self, step: &Step, folder: &str) -> Result<String> {
        if self.checkpoint.doc().folder(folder).is_some_and(|f| f.populated) {
            return Ok(format!("Already pushed {step}"));
        }
        let repository_id = self.code_repository_id(folder)?;
        let (endpoint, path) = {
            let run = self.folder_run(folder)?;
            (run.endpoint.clone(), run.path.clone())
        };
        let endpoint = endpoint.ok_or_else(|| {
            DeployError::Precondition(format!("Code repository of {folder} has no write endpoint"))
        })?;

        self.orch
            .collab
            .populator
            .populate(&endpoint, &path, self.user.as_ref())
            .await
            .map_err(|e| {
                DeployError::collaborator(format!("Failed to push {folder} to its code repository"), e)
            })?;

        let mut tags = self
            .orch
            .directory
            .resource(&self.auth, ResourceKind::CodeRepository, &repository_id)
            .await
            .map_err(|e| DeployError::remote("Failed to look up code repository", e))?
            .map(|info| info.tags)
            .unwrap_or_default();
        tags.remove(TAG_INCOMPLETE);
        let update = ResourceUpdate {
            tags: Some(tags),
            content: None,
        };
        self.orch
            .factory
            .update(&self.auth, ResourceKind::CodeRepository, &repository_id, update)
            .await
            .map_err(|e| DeployError::remote("Failed to mark code repository complete", e))?;

        self.checkpoint.doc_mut().folder_mut(folder).populated = true;
        self.checkpoint.persist()?;
        Ok(format!("Pushed {step}"))
    }

    async fn save_folder_manifest(&mut self, step: &Step, folder: &str) -> Result<String> {
        let slot_ref = SlotRef::FolderManifest {
            folder: folder.to_string(),
        };
        match self
            .save_manifest(&slot_ref, format!("{folder}_generated_resources"))
            .await
        {
            Ok(()) => Ok(format!("Saved {step}")),
            Err(e @ DeployError::Checkpoint(_)) => Err(e),
            Err(e) => {
                warn!(target: "hoist::deploy", "Failed to save {}: {}", step, e);
                Ok(format!("Skipped {step}"))
            }
        }
    }

    async fn save_services_config(&mut self, step: &Step, folder: &str) -> Result<String> {
        if self.background.is_pending(BackgroundKind::KnowledgeBase) {
            self.join_background(BackgroundKind::KnowledgeBase).await?;
        }

        let mut build_pipelines = Vec::new();
        let mut deployment_pipelines = Vec::new();
        if let Some(checkpoint) = self.checkpoint.doc().folder(folder) {
            let scoped = std::iter::once((None, &checkpoint.resources)).chain(
                checkpoint
                    .submodules
                    .iter()
                    .map(|(name, sub)| (Some(name.as_str()), &sub.resources)),
            );
            for (sub, resources) in scoped {
                for (key, slot) in resources.iter() {
                    let (Some(id), Some((is_build, display_name))) =
                        (slot.id(), pipeline_name(folder, sub, key))
                    else {
                        continue;
                    };
                    let entry = PipelineEntry {
                        id: id.to_string(),
                        display_name,
                    };
                    if is_build {
                        build_pipelines.push(entry);
                    } else {
                        deployment_pipelines.push(entry);
                    }
                }
            }
        }

        let config = ServicesConfig {
            version: SERVICES_VERSION.to_string(),
            profile: self.auth.profile.clone(),
            region: self.auth.region.clone(),
            compartment_id: self.compartment.id.clone(),
            project_id: self.project_id()?,
            code_repository_id: self.code_repository_id(folder)?,
            build_pipelines,
            deployment_pipelines,
            knowledge_base_id: self.knowledge_base_id.clone(),
        };
        let path = self.folder_run(folder)?.path.clone();
        self.orch
            .collab
            .services
            .write(&path, &config)
            .map_err(|e| DeployError::collaborator(format!("Failed to save {step}"), e))?;
        Ok(format!("Saved {step}"))
    }
}

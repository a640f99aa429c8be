//! Build and deployment specification templates.
//!
//! Templates use `{{key}}` placeholders. Build specs are written into the
//! folder's `.hoist/` directory so they are pushed with the sources; the
//! deployment specs become inline artifact content.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

/// Directory inside each deployed folder receiving generated files.
pub const GENERATED_DIR: &str = ".hoist";

pub type TemplateValues = BTreeMap<String, String>;

pub trait TemplateExpander: Send + Sync {
    /// Expand a named template with the given values.
    fn expand(&self, template: &str, values: &TemplateValues) -> anyhow::Result<String>;

    /// Write generated content to `<folder>/.hoist/<file_name>`.
    fn write(&self, folder: &Path, file_name: &str, content: &str) -> anyhow::Result<PathBuf> {
        let dir = folder.join(GENERATED_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        let path = dir.join(file_name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

const BUILD_SPEC: &str = r#"version: 0.1
component: build
timeoutInSeconds: 1800
shell: bash
steps:
  - type: Command
    name: "Build {{binary_label}}"
    command: |
      {{build_command}}
outputArtifacts:
  - name: {{output_name}}
    type: BINARY
    location: {{artifact_location}}
"#;

const BUILD_SPEC_NO_OUTPUT_ARTIFACTS: &str = r#"version: 0.1
component: build
timeoutInSeconds: 1800
shell: bash
steps:
  - type: Command
    name: "Build {{binary_label}}"
    command: |
      {{build_command}}
  - type: Command
    name: "Upload {{binary_label}}"
    command: |
      oci artifacts generic artifact upload-by-path --repository-id {{artifact_repository_id}} --artifact-path {{artifact_path}} --artifact-version ${OCI_BUILD_RUN_ID} --content-body {{artifact_location}}
"#;

const CONTAINER_BUILD_SPEC: &str = r#"version: 0.1
component: build
timeoutInSeconds: 1800
shell: bash
env:
  exportedVariables:
    - DOCKER_TAG
steps:
  - type: Command
    name: "Build {{image_label}} image"
    command: |
      {{build_command}}
      export DOCKER_TAG=${OCI_BUILD_RUN_ID}
      docker build -f {{docker_file}} -t {{image_name}}:${DOCKER_TAG} --build-arg ARTIFACT={{artifact_location}} .
outputArtifacts:
  - name: {{output_name}}
    type: DOCKER_IMAGE
    location: {{image_name}}:${DOCKER_TAG}
"#;

const DOCKERFILE_JVM: &str = r#"FROM ghcr.io/graalvm/jdk-community:21
ARG ARTIFACT
COPY ${ARTIFACT} /app/application.jar
EXPOSE 8080
CMD ["java", "-jar", "/app/application.jar"]
"#;

const DOCKERFILE_NATIVE: &str = r#"FROM gcr.io/distroless/base-debian12
ARG ARTIFACT
COPY ${ARTIFACT} /app/application
EXPOSE 8080
CMD ["/app/application"]
"#;

const SETUP_SECRET_COMMAND: &str = r#"version: 0.1
component: command
timeoutInSeconds: 600
shell: bash
steps:
  - type: Command
    name: "Create registry pull secret"
    command: |
      oci ce cluster create-kubeconfig --cluster-id {{cluster_id}} --region {{region}} --file $HOME/.kube/config
      kubectl delete secret {{secret_name}} --ignore-not-found
      kubectl create secret docker-registry {{secret_name}} --docker-server={{repo_endpoint}} --docker-username="${REGISTRY_USER}" --docker-password="${AUTH_TOKEN}"
      kubectl label secret {{secret_name}} app={{app_name}}
"#;

const CONFIG_MAP: &str = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: {{app_name}}-config
data:
  application.properties: ""
"#;

const DEPLOY_CONFIG: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: {{app_name}}-deployment
spec:
  selector:
    matchLabels:
      app: {{app_name}}
  replicas: 1
  template:
    metadata:
      labels:
        app: {{app_name}}
    spec:
      containers:
        - name: {{app_name}}
          image: {{image_name}}:${DOCKER_TAG}
          ports:
            - containerPort: 8080
          envFrom:
            - configMapRef:
                name: {{app_name}}-config
      imagePullSecrets:
        - name: {{secret_name}}
---
apiVersion: v1
kind: Service
metadata:
  name: {{app_name}}-service
spec:
  selector:
    app: {{app_name}}
  ports:
    - port: 8080
      targetPort: 8080
  type: LoadBalancer
"#;

/// The templates shipped with hoist.
#[derive(Debug, Clone, Default)]
pub struct BuiltinTemplates;

impl BuiltinTemplates {
    pub const BUILD_SPEC: &'static str = "build_spec.yaml";
    pub const BUILD_SPEC_NO_OUTPUT_ARTIFACTS: &'static str = "build_spec_no_output_artifacts.yaml";
    pub const CONTAINER_BUILD_SPEC: &'static str = "container_build_spec.yaml";
    pub const DOCKERFILE_JVM: &'static str = "Dockerfile.jvm";
    pub const DOCKERFILE_NATIVE: &'static str = "Dockerfile.native";
    pub const SETUP_SECRET_COMMAND: &'static str = "setup_secret_command.yaml";
    pub const CONFIG_MAP: &'static str = "config_map.yaml";
    pub const DEPLOY_CONFIG: &'static str = "deploy_config.yaml";

    fn source(name: &str) -> Option<&'static str> {
        match name {
            Self::BUILD_SPEC => Some(BUILD_SPEC),
            Self::BUILD_SPEC_NO_OUTPUT_ARTIFACTS => Some(BUILD_SPEC_NO_OUTPUT_ARTIFACTS),
            Self::CONTAINER_BUILD_SPEC => Some(CONTAINER_BUILD_SPEC),
            Self::DOCKERFILE_JVM => Some(DOCKERFILE_JVM),
            Self::DOCKERFILE_NATIVE => Some(DOCKERFILE_NATIVE),
            Self::SETUP_SECRET_COMMAND => Some(SETUP_SECRET_COMMAND),
            Self::CONFIG_MAP => Some(CONFIG_MAP),
            Self::DEPLOY_CONFIG => Some(DEPLOY_CONFIG),
            _ => None,
        }
    }
}

impl TemplateExpander for BuiltinTemplates {
    fn expand(&self, template: &str, values: &TemplateValues) -> anyhow::Result<String> {
        let source = Self::source(template)
            .ok_or_else(|| anyhow::anyhow!("Unknown template: {}", template))?;
        substitute(source, values).with_context(|| format!("Failed to expand template {template}"))
    }
}

/// Replace every `{{key}}`; unknown keys are an error.
pub fn substitute(source: &str, values: &TemplateValues) -> anyhow::Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| anyhow::anyhow!("Unterminated placeholder in template"))?;
        let key = after[..end].trim();
        let value = values
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("No value for placeholder '{}'", key))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> TemplateValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_placeholders() {
        let out = substitute("run {{ cmd }} in {{dir}}", &values(&[("cmd", "make"), ("dir", "out")]))
            .unwrap();
        assert_eq!(out, "run make in out");
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = substitute("{{cmd}}", &TemplateValues::new()).unwrap_err();
        assert!(err.to_string().contains("cmd"));
    }

    #[test]
    fn config_map_expands() {
        let out = BuiltinTemplates
            .expand(BuiltinTemplates::CONFIG_MAP, &values(&[("app_name", "shop")]))
            .unwrap();
        assert!(out.contains("name: shop-config"));
    }

    #[test]
    fn unknown_template_is_rejected() {
        assert!(BuiltinTemplates.expand("nope.yaml", &TemplateValues::new()).is_err());
    }
}

//! Names of generated resources.

use chrono::{DateTime, Utc};

use crate::types::Flavor;

/// Notification topic shared by every project of a compartment.
pub const NOTIFICATION_TOPIC_NAME: &str = "hoist-notifications";
/// Log group shared by every project of a compartment.
pub const LOG_GROUP_NAME: &str = "hoist-default-log-group";

/// Unique label attached to every resource created by one deployment.
pub fn run_tag(now: DateTime<Utc>) -> String {
    format!("hoist-deploy-{}", now.to_rfc3339())
}

/// Kubernetes-safe application name: lowercase, non-alphanumeric runs
/// collapsed into `-`.
pub fn app_name(repository: &str) -> String {
    let mut out = String::with_capacity(repository.len());
    let mut pending_dash = false;
    for ch in repository.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if pending_dash && !out.is_empty() {
        out.push('-');
    }
    out
}

pub fn secret_name(repository: &str) -> String {
    format!("{}-hoist-generated-registry-secret", app_name(repository))
}

/// `<base>Log`, the first name tried for a project log.
pub fn log_name(base: &str) -> String {
    format!("{base}Log")
}

/// First of `<base>Log1`, `<base>Log2`, … not present in `existing`.
pub fn next_free_log_name(base: &str, existing: &[String]) -> String {
    (1u64..)
        .map(|n| format!("{base}Log{n}"))
        .find(|candidate| !existing.iter().any(|e| e == candidate))
        .unwrap_or_else(|| log_name(base))
}

pub fn container_repository_name(repository: &str, submodule: Option<&str>, flavor: Flavor) -> String {
    match submodule {
        Some(sub) => format!("{}-{}-{}", app_name(repository), app_name(sub), flavor.token()),
        None => format!("{}-{}", app_name(repository), flavor.token()),
    }
}

/// Fully qualified image name in the regional container registry.
pub fn image_name(region: &str, namespace: &str, container_repository: &str) -> String {
    format!("{}/{}/{}", registry_endpoint(region), namespace, container_repository)
}

pub fn registry_endpoint(region: &str) -> String {
    format!("{region}.ocir.io")
}

/// File name of a generated spec, unique per submodule and flavor.
pub fn spec_file_name(stem: &str, submodule: Option<&str>, flavor: Option<Flavor>) -> String {
    let mut name = String::new();
    if let Some(sub) = submodule {
        name.push_str(&app_name(sub));
        name.push('_');
    }
    if let Some(flavor) = flavor {
        name.push_str(flavor.token());
        name.push('_');
    }
    name.push_str(stem);
    name
}

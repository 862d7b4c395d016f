//! App Custom Resource Definition
//!
//! An App is a deployable unit pushed into a space (namespace). Its
//! `spec.instances.stopped` flag is the desired run-state that `kf start` and
//! `kf stop` toggle.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ReadyCondition};

/// Specification for an App
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kf.dev",
    version = "v1alpha1",
    kind = "App",
    plural = "apps",
    namespaced,
    status = "AppStatus",
    printcolumn = r#"{"name":"Stopped","type":"boolean","jsonPath":".spec.instances.stopped"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Desired instance state
    #[serde(default)]
    pub instances: AppInstances,

    /// Container template, when the app runs a prebuilt image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<AppTemplate>,

    /// Source the app was pushed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AppSource>,
}

/// Desired instance state of an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppInstances {
    /// When true the app is scaled to zero and not routed
    #[serde(default)]
    pub stopped: bool,

    /// Requested replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

/// Container template for an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppTemplate {
    /// Container image
    pub image: String,
}

/// Source an App was built from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSource {
    /// Path of the pushed source directory
    pub path: String,
}

/// Status for an App
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Conditions reported by the app controller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Routable URL once the app is running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl App {
    /// Build an App that runs `image`
    pub fn from_image(name: &str, image: impl Into<String>) -> Self {
        App::new(
            name,
            AppSpec {
                template: Some(AppTemplate {
                    image: image.into(),
                }),
                ..Default::default()
            },
        )
    }

    /// Build an App from a source directory
    pub fn from_source(name: &str, path: impl Into<String>) -> Self {
        App::new(
            name,
            AppSpec {
                source: Some(AppSource { path: path.into() }),
                ..Default::default()
            },
        )
    }

    /// Returns true when the desired run-state is stopped
    pub fn is_stopped(&self) -> bool {
        self.spec.instances.stopped
    }
}

impl ReadyCondition for App {
    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

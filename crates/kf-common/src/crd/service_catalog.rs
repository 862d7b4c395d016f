//! Service catalog resources: brokers, instances and bindings
//!
//! A namespaced broker advertises service classes and plans. An instance
//! provisions one plan of one class. A binding attaches an instance to an app,
//! producing the credentials secret the app reads at start-up.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ReadyCondition};

/// Label carrying the owning app on a ServiceBinding
pub const BINDING_APP_LABEL: &str = "kf.dev/app";

/// Specification for a namespaced ServiceBroker
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceBroker",
    plural = "servicebrokers",
    namespaced,
    status = "ServiceCatalogStatus",
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".spec.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBrokerSpec {
    /// URL of the Open Service Broker API endpoint
    pub url: String,
}

/// Specification for a ServiceInstance
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceInstance",
    plural = "serviceinstances",
    namespaced,
    status = "ServiceCatalogStatus",
    printcolumn = r#"{"name":"Class","type":"string","jsonPath":".spec.serviceClassExternalName"}"#,
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.servicePlanExternalName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    /// Service class as advertised by the broker
    pub service_class_external_name: String,
    /// Service plan as advertised by the broker
    pub service_plan_external_name: String,
}

/// Specification for a ServiceBinding
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceBinding",
    plural = "servicebindings",
    namespaced,
    status = "ServiceCatalogStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    /// Instance being bound
    pub instance_ref: LocalObjectReference,
    /// Secret the broker credentials are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Reference to an object in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct LocalObjectReference {
    /// Object name
    pub name: String,
}

/// Status shared by brokers, instances and bindings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCatalogStatus {
    /// Conditions reported by the service catalog controller
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ServiceBroker {
    /// Build a broker pointing at `url`
    pub fn with_url(name: &str, url: impl Into<String>) -> Self {
        ServiceBroker::new(name, ServiceBrokerSpec { url: url.into() })
    }
}

impl ServiceInstance {
    /// Build an instance of `class`/`plan`
    pub fn of_plan(name: &str, class: impl Into<String>, plan: impl Into<String>) -> Self {
        ServiceInstance::new(
            name,
            ServiceInstanceSpec {
                service_class_external_name: class.into(),
                service_plan_external_name: plan.into(),
            },
        )
    }
}

impl ServiceBinding {
    /// Build the binding `name` of `instance` to `app`.
    ///
    /// Credentials land in a secret of the same name.
    pub fn for_app(name: &str, app: &str, instance: &str) -> Self {
        let mut binding = ServiceBinding::new(
            name,
            ServiceBindingSpec {
                instance_ref: LocalObjectReference {
                    name: instance.to_string(),
                },
                secret_name: Some(name.to_string()),
            },
        );
        binding.metadata.labels = Some(BTreeMap::from([(
            BINDING_APP_LABEL.to_string(),
            app.to_string(),
        )]));
        binding
    }

    /// App this binding belongs to
    pub fn app_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(BINDING_APP_LABEL))
            .map(String::as_str)
    }
}

/// Cluster-local URL of a broker served by an app in `namespace`
pub fn internal_broker_url(app: &str, namespace: &str) -> String {
    format!("http://{}.{}.svc.cluster.local", app, namespace)
}

macro_rules! impl_ready_condition {
    ($($kind:ty),+) => {
        $(
            impl ReadyCondition for $kind {
                fn conditions(&self) -> &[Condition] {
                    self.status
                        .as_ref()
                        .map(|s| s.conditions.as_slice())
                        .unwrap_or_default()
                }
            }
        )+
    };
}

impl_ready_condition!(ServiceBroker, ServiceInstance, ServiceBinding);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::Condition;

    #[test]
    fn broker_url_is_cluster_local() {
        assert_eq!(
            internal_broker_url("broker-app", "dev"),
            "http://broker-app.dev.svc.cluster.local"
        );
    }

    #[test]
    fn binding_is_named_and_labelled_after_its_app() {
        let binding = ServiceBinding::for_app("envs-db", "envs", "db");
        assert_eq!(binding.metadata.name.as_deref(), Some("envs-db"));
        assert_eq!(binding.app_name(), Some("envs"));
        assert_eq!(binding.spec.instance_ref.name, "db");
        assert_eq!(binding.spec.secret_name.as_deref(), Some("envs-db"));
    }

    #[test]
    fn instance_serializes_external_names() {
        let instance = ServiceInstance::of_plan("db", "fake-service", "fake-plan");
        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["apiVersion"], "servicecatalog.k8s.io/v1beta1");
        assert_eq!(json["spec"]["serviceClassExternalName"], "fake-service");
        assert_eq!(json["spec"]["servicePlanExternalName"], "fake-plan");
    }

    #[test]
    fn readiness_follows_status_conditions() {
        let mut broker = ServiceBroker::with_url("b", "http://b");
        assert!(!broker.is_ready());

        broker.status = Some(ServiceCatalogStatus {
            conditions: vec![Condition::ready()],
        });
        assert!(broker.is_ready());
    }
}

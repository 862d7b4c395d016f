//! Custom Resource Definitions used by kf
//!
//! kf only reads and writes these resources; their controllers live on the
//! cluster.

mod app;
mod service_catalog;
mod types;

pub use app::{App, AppInstances, AppSource, AppSpec, AppStatus, AppTemplate};
pub use service_catalog::{
    internal_broker_url, LocalObjectReference, ServiceBinding, ServiceBindingSpec,
    ServiceBroker, ServiceBrokerSpec, ServiceCatalogStatus, ServiceInstance, ServiceInstanceSpec,
    BINDING_APP_LABEL,
};
pub use types::{Condition, ConditionStatus, ReadyCondition, READY_CONDITION};

//! Integration-test harness for kf
//!
//! Tests compose provisioning scopes that create real resources, wait for
//! them to become ready, pass their names down through a typed context and
//! always clean up after themselves:
//!
//! ```ignore
//! static CLUSTER_HEALTHY: PreconditionGate = PreconditionGate::new();
//!
//! CLUSTER_HEALTHY.run(|| doctor(&client)).await?;
//! let ctx = TestContext::new().with::<SpaceKey>(space);
//!
//! harness.with_service_broker(&ctx, |ctx| async move {
//!     harness.with_service_instance(&ctx, |ctx| async move {
//!         assert_marketplace_lists(&broker_from_context(&ctx));
//!         Ok(())
//!     }).await
//! }).await?;
//! ```
//!
//! # Modules
//!
//! - [`context`] - Typed, immutable context carried into nested scopes
//! - [`gate`] - Once-per-process precondition check
//! - [`scope`] - The with-resource orchestrator and [`Provisioner`] trait
//! - [`readiness`] - Readiness polling and timeouts
//! - [`services`] - Broker, instance and binding scopes

#![deny(missing_docs)]

pub mod context;
pub mod error;
pub mod gate;
pub mod readiness;
pub mod scope;
pub mod services;

pub use context::{
    AppKey, BrokerAppKey, BrokerKey, ContextKey, ServiceBindingKey, ServiceClassKey,
    ServiceInstanceKey, ServicePlanKey, SpaceKey, TestContext,
};
pub use error::HarnessError;
pub use gate::{GateState, PreconditionGate};
pub use readiness::{Readiness, ScopeTimeouts};
pub use scope::{NameGenerator, Orchestrator, Provisioner, ResourceRef, TeardownFailure};
pub use services::{
    app_from_context, binding_from_context, broker_from_context, service_class_from_context,
    service_instance_from_context, service_plan_from_context, space_from_context,
    ServiceClients, ServiceFixtures, ServiceHarness,
};

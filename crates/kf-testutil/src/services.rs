//! Service catalog scopes: broker, instance and binding
//!
//! Each scope provisions its resources through a [`LifecycleClient`] and
//! publishes their names to nested scopes through the context:
//!
//! - [`ServiceHarness::with_service_broker`] pushes the broker app, registers
//!   it as a broker and binds [`BrokerKey`]
//! - [`ServiceHarness::with_service_instance`] creates an instance of the
//!   broker's plan and binds [`ServiceClassKey`], [`ServicePlanKey`] and
//!   [`ServiceInstanceKey`]
//! - [`ServiceHarness::with_service_binding`] pushes an app, binds the
//!   instance to it and binds [`AppKey`] and [`ServiceBindingKey`]

use std::future::Future;

use async_trait::async_trait;
use kf_common::crd::{
    internal_broker_url, App, ReadyCondition, ServiceBinding, ServiceBroker, ServiceInstance,
};
use kf_common::LifecycleClient;
use kube::Client;

use crate::context::{
    AppKey, BrokerAppKey, BrokerKey, ServiceBindingKey, ServiceClassKey, ServiceInstanceKey,
    ServicePlanKey, SpaceKey, TestContext,
};
use crate::scope::{Orchestrator, Provisioner, ResourceRef};
use crate::HarnessError;

/// Space the test runs in
#[track_caller]
pub fn space_from_context(ctx: &TestContext) -> String {
    ctx.get::<SpaceKey>()
}

/// Broker registered by an enclosing [`ServiceHarness::with_service_broker`]
#[track_caller]
pub fn broker_from_context(ctx: &TestContext) -> String {
    ctx.get::<BrokerKey>()
}

/// Service class of the enclosing instance scope
#[track_caller]
pub fn service_class_from_context(ctx: &TestContext) -> String {
    ctx.get::<ServiceClassKey>()
}

/// Service plan of the enclosing instance scope
#[track_caller]
pub fn service_plan_from_context(ctx: &TestContext) -> String {
    ctx.get::<ServicePlanKey>()
}

/// Instance created by the enclosing instance scope
#[track_caller]
pub fn service_instance_from_context(ctx: &TestContext) -> String {
    ctx.get::<ServiceInstanceKey>()
}

/// App bound by the enclosing binding scope
#[track_caller]
pub fn app_from_context(ctx: &TestContext) -> String {
    ctx.get::<AppKey>()
}

/// Binding created by the enclosing binding scope
#[track_caller]
pub fn binding_from_context(ctx: &TestContext) -> String {
    ctx.get::<ServiceBindingKey>()
}

/// Names and sources of the fixtures the scopes provision
#[derive(Debug, Clone)]
pub struct ServiceFixtures {
    /// Source of the app serving the fake broker
    pub broker_app_path: String,
    /// Source of the app bound to the instance
    pub bound_app_path: String,
    /// Service class advertised by the fake broker
    pub service_class: String,
    /// Service plan advertised by the fake broker
    pub service_plan: String,
}

impl Default for ServiceFixtures {
    fn default() -> Self {
        Self {
            broker_app_path: "./samples/apps/service-broker".to_string(),
            bound_app_path: "./samples/apps/envs".to_string(),
            service_class: "fake-service".to_string(),
            service_plan: "fake-plan".to_string(),
        }
    }
}

/// Clients for every kind the service scopes touch
#[derive(Clone)]
pub struct ServiceClients {
    /// Apps
    pub apps: LifecycleClient<App>,
    /// Service brokers
    pub brokers: LifecycleClient<ServiceBroker>,
    /// Service instances
    pub instances: LifecycleClient<ServiceInstance>,
    /// Service bindings
    pub bindings: LifecycleClient<ServiceBinding>,
}

impl ServiceClients {
    /// Clients talking to the cluster through `client`
    pub fn kube(client: Client) -> Self {
        Self {
            apps: LifecycleClient::kube(client.clone()),
            brokers: LifecycleClient::kube(client.clone()),
            instances: LifecycleClient::kube(client.clone()),
            bindings: LifecycleClient::kube(client),
        }
    }
}

/// Entry point for the service catalog scopes
pub struct ServiceHarness {
    orchestrator: Orchestrator,
    broker_app: AppProvisioner,
    broker: BrokerProvisioner,
    instance: InstanceProvisioner,
    bound_app: AppProvisioner,
    binding: BindingProvisioner,
}

impl ServiceHarness {
    /// Build the scopes over `clients`
    pub fn new(orchestrator: Orchestrator, clients: ServiceClients, fixtures: ServiceFixtures) -> Self {
        Self {
            orchestrator,
            broker_app: AppProvisioner {
                client: clients.apps.clone(),
                base: "integration-broker-app",
                source: fixtures.broker_app_path,
                role: AppRole::BrokerBackend,
            },
            broker: BrokerProvisioner {
                client: clients.brokers,
            },
            instance: InstanceProvisioner {
                client: clients.instances,
                class: fixtures.service_class,
                plan: fixtures.service_plan,
            },
            bound_app: AppProvisioner {
                client: clients.apps,
                base: "integration-binding-app",
                source: fixtures.bound_app_path,
                role: AppRole::Bound,
            },
            binding: BindingProvisioner {
                client: clients.bindings,
            },
        }
    }

    /// Orchestrator running the scopes
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run `body` with a registered, ready broker.
    ///
    /// Requires [`SpaceKey`] in `ctx`.
    pub async fn with_service_broker<B, Fut, T>(
        &self,
        ctx: &TestContext,
        body: B,
    ) -> Result<T, HarnessError>
    where
        B: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<T, HarnessError>>,
    {
        self.orchestrator
            .with_resource(ctx, &self.broker_app, |ctx| async move {
                self.orchestrator
                    .with_resource(&ctx, &self.broker, body)
                    .await
            })
            .await
    }

    /// Run `body` with a ready instance of the fixture class and plan.
    ///
    /// Must be nested inside [`with_service_broker`](Self::with_service_broker).
    pub async fn with_service_instance<B, Fut, T>(
        &self,
        ctx: &TestContext,
        body: B,
    ) -> Result<T, HarnessError>
    where
        B: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<T, HarnessError>>,
    {
        self.orchestrator
            .with_resource(ctx, &self.instance, body)
            .await
    }

    /// Run `body` with an app bound to the enclosing instance.
    ///
    /// Must be nested inside [`with_service_instance`](Self::with_service_instance).
    pub async fn with_service_binding<B, Fut, T>(
        &self,
        ctx: &TestContext,
        body: B,
    ) -> Result<T, HarnessError>
    where
        B: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<T, HarnessError>>,
    {
        self.orchestrator
            .with_resource(ctx, &self.bound_app, |ctx| async move {
                self.orchestrator
                    .with_resource(&ctx, &self.binding, body)
                    .await
            })
            .await
    }
}

async fn probe<R>(client: &LifecycleClient<R>, id: &ResourceRef) -> kf_common::Result<bool>
where
    R: kube::Resource<DynamicType = ()> + ReadyCondition + Clone + std::fmt::Debug + Send + Sync + 'static,
{
    Ok(client.get(&id.namespace, &id.name).await?.is_ready())
}

#[derive(Debug, Clone, Copy)]
enum AppRole {
    BrokerBackend,
    Bound,
}

struct AppProvisioner {
    client: LifecycleClient<App>,
    base: &'static str,
    source: String,
    role: AppRole,
}

#[async_trait]
impl Provisioner for AppProvisioner {
    type Id = ResourceRef;

    fn kind(&self) -> &'static str {
        "App"
    }

    fn base_name(&self) -> &str {
        self.base
    }

    async fn create(&self, ctx: &TestContext, name: &str) -> kf_common::Result<ResourceRef> {
        let id = ResourceRef::in_space(ctx, name);
        self.client
            .create(&id.namespace, &App::from_source(name, self.source.as_str()))
            .await?;
        Ok(id)
    }

    async fn destroy(&self, id: &ResourceRef) -> kf_common::Result<()> {
        self.client.delete(&id.namespace, &id.name).await
    }

    async fn probe_ready(&self, id: &ResourceRef) -> kf_common::Result<bool> {
        probe(&self.client, id).await
    }

    fn bind(&self, ctx: &TestContext, id: &ResourceRef) -> TestContext {
        match self.role {
            AppRole::BrokerBackend => ctx.with::<BrokerAppKey>(id.name.clone()),
            AppRole::Bound => ctx.with::<AppKey>(id.name.clone()),
        }
    }
}

struct BrokerProvisioner {
    client: LifecycleClient<ServiceBroker>,
}

#[async_trait]
impl Provisioner for BrokerProvisioner {
    type Id = ResourceRef;

    fn kind(&self) -> &'static str {
        "ServiceBroker"
    }

    fn base_name(&self) -> &str {
        "fake-broker"
    }

    async fn create(&self, ctx: &TestContext, name: &str) -> kf_common::Result<ResourceRef> {
        let id = ResourceRef::in_space(ctx, name);
        let url = internal_broker_url(&ctx.get::<BrokerAppKey>(), &id.namespace);
        self.client
            .create(&id.namespace, &ServiceBroker::with_url(name, url))
            .await?;
        Ok(id)
    }

    async fn destroy(&self, id: &ResourceRef) -> kf_common::Result<()> {
        self.client.delete(&id.namespace, &id.name).await
    }

    async fn probe_ready(&self, id: &ResourceRef) -> kf_common::Result<bool> {
        probe(&self.client, id).await
    }

    fn bind(&self, ctx: &TestContext, id: &ResourceRef) -> TestContext {
        ctx.with::<BrokerKey>(id.name.clone())
    }
}

struct InstanceProvisioner {
    client: LifecycleClient<ServiceInstance>,
    class: String,
    plan: String,
}

#[async_trait]
impl Provisioner for InstanceProvisioner {
    type Id = ResourceRef;

    fn kind(&self) -> &'static str {
        "ServiceInstance"
    }

    fn base_name(&self) -> &str {
        "int-service-instance"
    }

    async fn create(&self, ctx: &TestContext, name: &str) -> kf_common::Result<ResourceRef> {
        let id = ResourceRef::in_space(ctx, name);
        let instance = ServiceInstance::of_plan(name, self.class.as_str(), self.plan.as_str());
        self.client.create(&id.namespace, &instance).await?;
        Ok(id)
    }

    async fn destroy(&self, id: &ResourceRef) -> kf_common::Result<()> {
        self.client.delete(&id.namespace, &id.name).await
    }

    async fn probe_ready(&self, id: &ResourceRef) -> kf_common::Result<bool> {
        probe(&self.client, id).await
    }

    fn bind(&self, ctx: &TestContext, id: &ResourceRef) -> TestContext {
        ctx.with::<ServiceClassKey>(self.class.clone())
            .with::<ServicePlanKey>(self.plan.clone())
            .with::<ServiceInstanceKey>(id.name.clone())
    }
}

struct BindingProvisioner {
    client: LifecycleClient<ServiceBinding>,
}

#[async_trait]
impl Provisioner for BindingProvisioner {
    type Id = ResourceRef;

    fn kind(&self) -> &'static str {
        "ServiceBinding"
    }

    fn base_name(&self) -> &str {
        "integration-binding"
    }

    async fn create(&self, ctx: &TestContext, name: &str) -> kf_common::Result<ResourceRef> {
        let id = ResourceRef::in_space(ctx, name);
        let binding =
            ServiceBinding::for_app(name, &ctx.get::<AppKey>(), &ctx.get::<ServiceInstanceKey>());
        self.client.create(&id.namespace, &binding).await?;
        Ok(id)
    }

    async fn destroy(&self, id: &ResourceRef) -> kf_common::Result<()> {
        self.client.delete(&id.namespace, &id.name).await
    }

    async fn probe_ready(&self, id: &ResourceRef) -> kf_common::Result<bool> {
        probe(&self.client, id).await
    }

    fn bind(&self, ctx: &TestContext, id: &ResourceRef) -> TestContext {
        ctx.with::<ServiceBindingKey>(id.name.clone())
    }
}

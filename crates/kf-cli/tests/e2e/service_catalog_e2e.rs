//! Service catalog e2e tests
//!
//! Each test nests the broker, instance and binding scopes as deep as it
//! needs and asserts against the names the scopes publish.

use kf_cli::commands::{delete_service_broker, start, stop};
use kf_common::crd::{ReadyCondition, BINDING_APP_LABEL};
use kf_testutil::{
    app_from_context, binding_from_context, broker_from_context, service_class_from_context,
    service_instance_from_context, service_plan_from_context, space_from_context, HarnessError,
};

use super::context::setup;

fn check(ok: bool, message: impl Into<String>) -> Result<(), HarnessError> {
    if ok {
        Ok(())
    } else {
        Err(HarnessError::body(message))
    }
}

#[tokio::test]
async fn broker_is_registered_and_ready() {
    let e2e = setup().await.unwrap();
    let e2e = &e2e;

    e2e.harness
        .with_service_broker(&e2e.root(), |ctx| async move {
            let broker = e2e
                .brokers
                .get(&space_from_context(&ctx), &broker_from_context(&ctx))
                .await?;
            check(broker.is_ready(), "broker registered but not ready")
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn instance_is_provisioned_from_the_broker_plan() {
    let e2e = setup().await.unwrap();
    let e2e = &e2e;

    e2e.harness
        .with_service_broker(&e2e.root(), |ctx| async move {
            e2e.harness
                .with_service_instance(&ctx, |ctx| async move {
                    let instance = e2e
                        .instances
                        .get(&space_from_context(&ctx), &service_instance_from_context(&ctx))
                        .await?;
                    check(instance.is_ready(), "instance not ready")?;
                    check(
                        instance.spec.service_class_external_name == service_class_from_context(&ctx),
                        "instance has the wrong service class",
                    )?;
                    check(
                        instance.spec.service_plan_external_name == service_plan_from_context(&ctx),
                        "instance has the wrong service plan",
                    )
                })
                .await
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn binding_attaches_the_instance_to_the_app() {
    let e2e = setup().await.unwrap();
    let e2e = &e2e;

    e2e.harness
        .with_service_broker(&e2e.root(), |ctx| async move {
            e2e.harness
                .with_service_instance(&ctx, |ctx| async move {
                    e2e.harness
                        .with_service_binding(&ctx, |ctx| async move {
                            let space = space_from_context(&ctx);
                            let binding = e2e
                                .bindings
                                .get(&space, &binding_from_context(&ctx))
                                .await?;

                            check(
                                binding.app_name() == Some(app_from_context(&ctx).as_str()),
                                format!("binding is not labelled {}", BINDING_APP_LABEL),
                            )?;
                            check(binding.is_ready(), "binding not ready")?;
                            check(
                                binding.spec.instance_ref.name == service_instance_from_context(&ctx),
                                "binding points at the wrong instance",
                            )
                        })
                        .await
                })
                .await
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn bound_app_can_be_stopped_and_started() {
    let e2e = setup().await.unwrap();
    let e2e = &e2e;

    e2e.harness
        .with_service_broker(&e2e.root(), |ctx| async move {
            e2e.harness
                .with_service_instance(&ctx, |ctx| async move {
                    e2e.harness
                        .with_service_binding(&ctx, |ctx| async move {
                            let space = space_from_context(&ctx);
                            let app = app_from_context(&ctx);
                            let fail = |e: kf_cli::Error| HarnessError::body(e.to_string());

                            stop::stop(&e2e.apps, &space, &app, &mut Vec::new())
                                .await
                                .map_err(fail)?;
                            check(e2e.apps.get(&space, &app).await?.is_stopped(), "app not stopped")?;

                            let mut out = Vec::new();
                            start::start(&e2e.apps, &space, &app, &mut out)
                                .await
                                .map_err(fail)?;
                            check(!e2e.apps.get(&space, &app).await?.is_stopped(), "app not started")?;
                            check(
                                String::from_utf8_lossy(&out).contains("asynchronously"),
                                "start printed no notice",
                            )
                        })
                        .await
                })
                .await
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn deleting_a_missing_broker_fails() {
    let e2e = setup().await.unwrap();

    let err = delete_service_broker::delete_service_broker(
        &e2e.brokers,
        &e2e.space,
        "kf-e2e-no-such-broker",
    )
    .await
    .unwrap_err();

    assert!(err.is_not_found(), "expected NotFound, got {err}");
}

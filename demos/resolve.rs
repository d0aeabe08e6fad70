use std::{sync::Arc, time::Duration};

use polaris_resolver::{
    core::{context::SDKContext, model::loadbalance::Criteria},
    discovery::{
        api::{new_consumer_api_by_context, ConsumerAPI},
        req::{GetHealthInstanceRequest, GetOneInstanceRequest, RetStatus, ServiceCallResult},
    },
};
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_file(true)
        .with_level(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_max_level(LevelFilter::INFO)
        .init();

    let start_time = std::time::Instant::now();
    let context = Arc::new(SDKContext::create_by_file("demos/polaris.yaml")?);
    tracing::info!("create sdk context cost: {:?}", start_time.elapsed());

    let consumer = new_consumer_api_by_context(context)?;

    let healthy = consumer
        .get_health_instance(GetHealthInstanceRequest {
            namespace: "rust-demo".to_string(),
            service: "polaris-rust-provider".to_string(),
            ..Default::default()
        })
        .await?;
    tracing::info!("healthy instances: {}", healthy.instances.len());

    for i in 0..10 {
        let mut req = GetOneInstanceRequest::new("rust-demo", "polaris-rust-provider");
        req.flow_id = uuid::Uuid::new_v4().to_string();
        req.route_info
            .metadata
            .insert("env".to_string(), "prod".to_string());
        if i % 2 == 0 {
            req.criteria = Criteria::with_policy("ringHash").with_hash_key(format!("user-{}", i));
        }
        match consumer.get_one_instance(req).await {
            Ok(rsp) => {
                tracing::info!(
                    "choose instance {} mirror {:?}",
                    rsp.instance.format_address(),
                    rsp.mirror_instance.as_ref().map(|ins| ins.format_address())
                );
                consumer
                    .report_service_call(ServiceCallResult::new(
                        rsp.instance.clone(),
                        RetStatus::RetSuccess,
                        Duration::from_millis(10 + i),
                    ))
                    .await;
            }
            Err(err) => {
                tracing::error!("get one instance fail: {}", err);
            }
        }
    }

    let err = consumer
        .get_one_instance(GetOneInstanceRequest::new("rust-demo", "not-exist"))
        .await
        .err();
    if let Some(err) = err {
        tracing::info!("resolve unknown service: {:?}", err.code());
    }

    Ok(())
}

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use lifecycle::{aws::ecs::TaskDefinitionRegistration, Adapter, Config, HttpSink};

async fn function_handler(
    adapter: &Adapter<TaskDefinitionRegistration<aws_sdk_ecs::Client>>,
    sink: &HttpSink,
    event: LambdaEvent<serde_json::Value>,
) -> Result<(), Error> {
    let (payload, context) = event.into_parts();
    let envelope = adapter
        .respond(sink, payload, &context.env_config.log_stream)
        .await?;
    tracing::debug!("answered with {}", envelope.status);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    config.init_logging();

    let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_ecs::Client::new(&cfg);
    let sink = HttpSink::new(&config)?;
    let adapter = Adapter::new(TaskDefinitionRegistration::new(client), config);
    run(service_fn(|event| function_handler(&adapter, &sink, event))).await
}

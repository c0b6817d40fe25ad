use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use lifecycle::{aws::codecommit::ApprovalRuleAssociation, Adapter, Config, HttpSink};

type Handler = Adapter<ApprovalRuleAssociation<aws_sdk_codecommit::Client>>;

/// Answers one CloudFormation lifecycle event.
///
/// Only an event without a `ResponseURL`, or an answer that could not be
/// delivered, fails the invocation.
async fn function_handler(
    adapter: &Handler,
    sink: &HttpSink,
    event: LambdaEvent<serde_json::Value>,
) -> Result<(), Error> {
    let (payload, context) = event.into_parts();
    adapter
        .respond(sink, payload, &context.env_config.log_stream)
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    config.init_logging();
    tracing::info!("starting with {config:?}");

    let cfg = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_codecommit::Client::new(&cfg);
    let sink = HttpSink::new(&config)?;
    let adapter = Adapter::new(ApprovalRuleAssociation::new(client), config);
    run(service_fn(|event| function_handler(&adapter, &sink, event))).await
}

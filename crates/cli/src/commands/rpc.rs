use rotor_core::{
    config::RotorConfig,
    metrics::MetricsCollector,
    upstream::{RequestDispatcher, RequestDispatcherBuilder, StateRegistry},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};

use super::utils::{print_error, print_info, CliError, CliResult};

/// Router assembled from configuration, plus what the commands report on.
pub struct Session {
    pub dispatcher: RequestDispatcher,
    pub registry: Arc<StateRegistry>,
    pub metrics: Option<Arc<MetricsCollector>>,
}

impl Session {
    pub fn from_config(config: &RotorConfig) -> CliResult<Self> {
        config.validate().map_err(CliError::Config)?;

        let registry = Arc::new(StateRegistry::new());
        let metrics = config.metrics.enabled.then(|| Arc::new(MetricsCollector::new()));

        let mut builder = RequestDispatcherBuilder::from_config(config).registry(Arc::clone(&registry));
        if let Some(metrics) = &metrics {
            builder = builder.metrics(Arc::clone(metrics));
        }

        Ok(Self { dispatcher: builder.build()?, registry, metrics })
    }
}

/// Parses `--params` as a JSON array; an absent value means no params.
pub fn parse_params(raw: Option<&str>) -> CliResult<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_str::<Value>(raw)? {
        params @ Value::Array(_) => Ok(Some(params)),
        other => Err(CliError::Input(format!("params must be a JSON array, got {other}"))),
    }
}

fn payload(method: &str, params: Option<Value>) -> Value {
    match params {
        Some(params) => json!({ "method": method, "params": params }),
        None => json!({ "method": method }),
    }
}

/// Sends one call and prints its `result`.
pub async fn call(session: &Session, method: &str, params: Option<Value>) -> CliResult<()> {
    let result = session.dispatcher.request(payload(method, params)).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Sends a raw JSON payload and prints the full response envelope.
pub async fn send(session: &Session, raw_payload: &str) -> CliResult<()> {
    let payload: Value = serde_json::from_str(raw_payload)
        .map_err(|e| CliError::Input(format!("payload is not valid JSON: {e}")))?;
    let response = session.dispatcher.send(payload).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Runs `count` calls in sequence, then prints the router snapshot.
pub async fn stats(
    session: &Session,
    method: &str,
    params: Option<Value>,
    count: usize,
    show_metrics: bool,
) -> CliResult<()> {
    let started = Instant::now();
    let mut failed = 0usize;

    for _ in 0..count {
        if let Err(e) = session.dispatcher.request(payload(method, params.clone())).await {
            failed += 1;
            print_error(&e.to_string());
        }
    }

    print_info(&format!(
        "{} of {count} calls succeeded in {:.2}s",
        count - failed,
        started.elapsed().as_secs_f64()
    ));

    let snapshots: Vec<Value> = session
        .registry
        .snapshots()
        .iter()
        .map(|snapshot| serde_json::to_value(&**snapshot))
        .collect::<Result<_, _>>()?;
    println!("{}", serde_json::to_string_pretty(&snapshots)?);

    if show_metrics {
        match &session.metrics {
            Some(metrics) => println!("{}", metrics.render()),
            None => print_info("metrics are disabled in configuration"),
        }
    }

    Ok(())
}

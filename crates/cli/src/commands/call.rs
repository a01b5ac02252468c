use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use conduit_core::{
    config::AppConfig,
    runtime::ConduitRuntime,
    types::{ChainId, ContractCall, Priority, Request},
};
use serde_json::Value;

use super::utils::print_error;

#[derive(Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    High,
    Medium,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::High => Self::High,
            PriorityArg::Medium => Self::Medium,
            PriorityArg::Low => Self::Low,
        }
    }
}

#[derive(Args)]
pub struct CallArgs {
    /// Network to route the call to
    #[arg(long)]
    pub chain_id: ChainId,

    /// Contract address
    #[arg(long)]
    pub address: String,

    /// Function name, used for the cache key
    #[arg(long)]
    pub function: String,

    /// ABI-encoded calldata (0x-prefixed hex)
    #[arg(long)]
    pub calldata: String,

    /// Function arguments as JSON, used for the cache key
    #[arg(long, default_value = "[]")]
    pub args: String,

    #[arg(long, value_enum, default_value = "high")]
    pub priority: PriorityArg,

    /// Page-context label for batch grouping
    #[arg(long)]
    pub context: Option<String>,

    /// Print the metrics snapshot after the call
    #[arg(long)]
    pub metrics: bool,
}

/// Parses the `--args` flag. Anything that is not valid JSON is taken as a single string argument.
fn parse_args(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn build_request(args: &CallArgs) -> Request {
    let call = ContractCall::new(&args.address, &args.function, parse_args(&args.args))
        .with_calldata(&args.calldata);
    let mut request =
        Request::new("cli-1", args.chain_id, call).with_priority(args.priority.into());
    if let Some(context) = &args.context {
        request = request.with_page_context(context);
    }
    request
}

pub async fn handle_call_command(config: AppConfig, args: CallArgs) -> Result<()> {
    let runtime = ConduitRuntime::builder()
        .with_config(config)
        .build()
        .context("failed to build runtime")?;

    let response = runtime.request_manager().execute(build_request(&args)).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if args.metrics {
        let snapshot = runtime.request_manager().get_metrics();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    runtime.shutdown().await;

    if let Some(error) = response.error {
        print_error(&error.to_string());
        bail!("call failed: {error}");
    }
    Ok(())
}

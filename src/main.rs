//! Zentinel SOAP client binary.
//!
//! Run with: `zentinel-soap-call --address http://localhost:8080/soap/hello
//! --namespace urn:hello --operation sayHello World`

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_host::{
    ClientBuilder, InterfaceOperation, ServiceInterface, SoapEnvironment, SoapHostConfig,
    SOAP_12_HTTP_BINDING,
};

/// Call an operation on a SOAP endpoint and print the result as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Endpoint address
    #[arg(short, long)]
    address: String,

    /// Operation to invoke
    #[arg(short, long)]
    operation: String,

    /// Target namespace of the service interface
    #[arg(short, long)]
    namespace: String,

    /// Service interface name
    #[arg(long, default_value = "Service")]
    interface: String,

    /// Parameter element names, in order (defaults to arg0, arg1, ...)
    #[arg(long, value_delimiter = ',')]
    params: Vec<String>,

    /// Operation arguments; JSON values are passed as-is, anything else as a string
    args: Vec<String>,

    /// Basic authentication user
    #[arg(short, long)]
    username: Option<String>,

    /// Basic authentication password
    #[arg(short, long, requires = "username")]
    password: Option<String>,

    /// Use the SOAP 1.2 binding
    #[arg(long)]
    soap12: bool,

    /// Send MTOM requests
    #[arg(long)]
    mtom: bool,

    /// Receive timeout in milliseconds (overrides the config file)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        SoapHostConfig::from_yaml_str(&content).context("Failed to parse config file")?
    } else {
        debug!("Config file not found, using defaults");
        SoapHostConfig::default()
    };

    let mut operation = InterfaceOperation::new(&args.operation);
    for param in &args.params {
        operation = operation.parameter(param);
    }
    let interface = ServiceInterface::new(&args.interface, &args.namespace).operation(operation);

    let mut builder = ClientBuilder::new(interface, &args.address)
        .context("Invalid client configuration")?
        .with_defaults(&config.client);
    if let Some(timeout) = args.timeout_ms {
        builder = builder.receive_timeout(Duration::from_millis(timeout));
    }
    if args.soap12 {
        builder = builder
            .binding_id(SOAP_12_HTTP_BINDING)
            .context("Invalid binding")?;
    }
    if args.mtom {
        builder = builder.enable_mtom();
    }
    if let Some(username) = &args.username {
        builder = builder.credentials(username, args.password.as_deref().unwrap_or_default());
    }

    let environment =
        SoapEnvironment::new(&config.servlet_path).context("Invalid servlet path")?;
    let client = environment
        .get_client(builder)
        .context("Failed to create client")?;

    let values: Vec<Value> = args.args.iter().map(|arg| parse_argument(arg)).collect();
    info!(address = %args.address, operation = %args.operation, "Invoking operation");

    let result = client
        .invoke(&args.operation, values)
        .await
        .with_context(|| format!("Call to {} failed", args.operation))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to render result")?
    );
    Ok(())
}

fn parse_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

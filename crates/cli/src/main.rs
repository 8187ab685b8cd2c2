use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kube::CustomResourceExt;
use tracing::{info, warn};

use jso_apply::DescriptorFactory;
use jso_core::{admission, ChildResource, Config, JsonServer};

#[derive(Parser, Debug)]
#[command(name = "jsoctl", version, about = "JsonServer operator")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespace to watch (run) or to place rendered children in (default: all / the record's)
    #[arg(long = "ns", global = true, env = "JSO_NAMESPACE")]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller until SIGINT/SIGTERM
    Run,
    /// Print the JsonServer CustomResourceDefinition
    Crd,
    /// Apply admission defaults and checks to a JsonServer manifest
    Validate {
        /// YAML or JSON manifest
        file: PathBuf,
    },
    /// Print the child resources a JsonServer manifest converges to
    Render {
        /// YAML or JSON manifest
        file: PathBuf,
    },
}

fn init_tracing() {
    let env = std::env::var("JSO_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(cfg: &Config) {
    if let Some(addr) = cfg.metrics_addr.as_deref() {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid JSO_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_record(path: &Path) -> Result<JsonServer> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    // YAML is a superset of JSON, one parser covers both
    serde_yaml::from_str(&raw).with_context(|| format!("parsing JsonServer from {}", path.display()))
}

fn manifest(child: &ChildResource) -> Result<serde_json::Value> {
    let v = match child {
        ChildResource::ConfigMap(o) => serde_json::to_value(o)?,
        ChildResource::Deployment(o) => serde_json::to_value(o)?,
        ChildResource::Service(o) => serde_json::to_value(o)?,
    };
    Ok(v)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut cfg = Config::from_env();
    if cli.namespace.is_some() {
        cfg.namespace = cli.namespace.clone();
    }

    match cli.command {
        Commands::Run => {
            init_metrics(&cfg);
            jso_controller::run(cfg).await?;
        }
        Commands::Crd => {
            let crd = JsonServer::crd();
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&crd)?),
                Output::Json => println!("{}", serde_json::to_string_pretty(&crd)?),
            }
        }
        Commands::Validate { file } => {
            let mut record = load_record(&file)?;
            admission::apply_defaults(&mut record, &cfg);
            let res = admission::validate(&record);
            match cli.output {
                Output::Human => match &res {
                    Ok(()) => println!("{}: ok (replicas={})", record.key(), record.spec.replicas.unwrap_or_default()),
                    Err(e) => {
                        for issue in &e.0 {
                            println!("{}: {}", record.key(), issue);
                        }
                    }
                },
                Output::Json => {
                    let issues = res.as_ref().err().map(|e| e.0.clone()).unwrap_or_default();
                    let body = serde_json::json!({
                        "name": record.key().to_string(),
                        "valid": issues.is_empty(),
                        "issues": issues,
                        "spec": record.spec,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
            }
            res.map_err(|e| anyhow!("{} rejected: {}", file.display(), e))?;
        }
        Commands::Render { file } => {
            let mut record = load_record(&file)?;
            if record.metadata.namespace.is_none() {
                record.metadata.namespace = Some(cli.namespace.clone().unwrap_or_else(|| "default".to_string()));
            }
            admission::apply_defaults(&mut record, &cfg);
            jso_core::validate_config(&record.spec.json_config)?;
            let docs = DescriptorFactory::new(&cfg)
                .build_all(&record)
                .iter()
                .map(manifest)
                .collect::<Result<Vec<_>>>()?;
            match cli.output {
                Output::Human => {
                    for doc in &docs {
                        println!("---");
                        print!("{}", serde_yaml::to_string(doc)?);
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&docs)?),
            }
        }
    }

    Ok(())
}

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use entityhost::{Barrier, BarrierConfig, Connection, DestroyPolicy, RegistryConfig, start_registry};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Run barrier rounds from concurrent sessions against an in-process registry.
#[derive(Debug, Parser)]
#[command(name = "entityhost", version)]
struct Cli {
    /// Parties per barrier round (one session per party)
    #[arg(long, default_value_t = 3)]
    parties: u32,

    /// Number of rounds every party runs
    #[arg(long, default_value_t = 2)]
    rounds: u64,

    /// Barrier name
    #[arg(long, default_value = "demo-barrier")]
    name: String,

    /// Registry configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Destroy behavior while handles are open (overrides the config file)
    #[arg(long, value_enum)]
    destroy_policy: Option<PolicyArg>,

    /// Drain timeout for permissive destroy, in milliseconds
    #[arg(long)]
    drain_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Strict,
    Permissive,
    Relaxed,
}

impl From<PolicyArg> for DestroyPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Strict => DestroyPolicy::Strict,
            PolicyArg::Permissive => DestroyPolicy::Permissive,
            PolicyArg::Relaxed => DestroyPolicy::Relaxed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if cli.parties == 0 {
        bail!("--parties must be > 0");
    }

    let config = load_config(&cli)?;
    info!(policy = ?config.destroy_policy, drain_timeout_ms = config.drain_timeout_ms, "starting entity registry");
    let registry = start_registry(config)
        .await
        .context("failed to start entity registry")?;

    let admin = Connection::new(registry.clone());
    let gate = admin.get_entity_ref::<Barrier>(&cli.name, 1);
    gate.create(&BarrierConfig::new(cli.parties))
        .await
        .with_context(|| format!("failed to create barrier '{}'", cli.name))?;

    let mut parties = Vec::new();
    for party in 0..cli.parties {
        let conn = Connection::new(registry.clone());
        let name = cli.name.clone();
        let rounds = cli.rounds;

        parties.push(tokio::spawn(async move {
            let barrier = conn.get_entity_ref::<Barrier>(&name, 1).fetch_entity().await?;
            for round in 0..rounds {
                let released = barrier.arrive().await?;
                info!(party, round, released, session = %conn.id(), "released");
            }
            barrier.close()
        }));
    }

    for outcome in futures::future::join_all(parties).await {
        outcome.context("party task panicked")??;
    }

    info!("{}", registry.stats().await);
    gate.destroy().await.context("failed to destroy barrier")?;
    registry.shutdown().await;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<RegistryConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            RegistryConfig::from_json(&json).context("invalid registry configuration")?
        }
        None => RegistryConfig::default(),
    };

    if let Some(policy) = cli.destroy_policy {
        config = config.destroy_policy(policy.into());
    }
    if let Some(ms) = cli.drain_timeout_ms {
        config = config.drain_timeout(Duration::from_millis(ms));
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entityhost=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

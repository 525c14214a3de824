use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing_subscriber::EnvFilter;

use ipv6config::NetError;
use ipv6config::apply::{Trigger, apply_preferences};
use ipv6config::command::SystemRunner;
use ipv6config::config::{CliArgs, Command, Config, TunnelAction};
use ipv6config::interfaces::{InterfaceRecord, list_interfaces};
use ipv6config::mutate::{InterfaceSelection, NetworkMutator, SixToFourTunnel, is_privacy_supported_in_kernel};
use ipv6config::routes::{
    RouteRecord, ifaces_with_ipv6_default_route, ipv4_default_route, list_routes, outbound_ipv4_address,
};
use ipv6config::stats::read_link_stats;
use ipv6config::tool::{NetContext, ToolLocator};

/// Everything this host reports about its network state at one point in time
#[derive(Debug, Serialize)]
struct Snapshot {
    hostname: String,
    timestamp: DateTime<Utc>,
    tool: String,
    privacy_supported: bool,
    interfaces: Vec<InterfaceRecord>,
    ipv4_routes: Vec<RouteRecord>,
    ipv6_routes: Vec<RouteRecord>,
    ipv4_default_route: Option<RouteRecord>,
    outbound_ipv4_address: Option<Ipv4Addr>,
    ipv6_default_ifaces: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Located {
    tool: String,
    tried: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let config = Config::load(&cli)?;

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str().to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli.command, &config).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: &Command, config: &Config) -> Result<(), NetError> {
    let runner = SystemRunner::new(config.command_timeout);
    let locator = ToolLocator::new(config.search.clone());

    let ctx = match NetContext::resolve(runner.clone(), &locator, config.host.clone()).await {
        Err(e) if e.is_retryable() => {
            tracing::warn!("Tool resolution failed ({}), retrying once", e);
            NetContext::resolve(runner, &locator, config.host.clone()).await?
        }
        result => result?,
    };

    match command {
        Command::Locate => print_json(&Located {
            tool: ctx.ip().to_string(),
            tried: locator.tried(),
        }),
        Command::Interfaces { iface } => print_json(&list_interfaces(&ctx, iface.as_deref()).await?),
        Command::Routes { ipv6 } => print_json(&list_routes(&ctx, *ipv6).await),
        Command::Snapshot => print_json(&snapshot(&ctx).await),
        Command::Stats { iface } => print_json(&read_link_stats(&ctx, iface).await?),
        Command::Privacy {
            enable,
            disable,
            reload,
            discover,
        } => {
            if enable == disable {
                return Err(NetError::Config("privacy needs exactly one of --enable or --disable".to_string()));
            }
            if !is_privacy_supported_in_kernel(&config.host.conf_root) {
                return Err(NetError::Precondition(format!(
                    "no address privacy support below {}",
                    config.host.conf_root.display()
                )));
            }
            let selection = if *discover {
                InterfaceSelection::Discover
            } else {
                config.preferences.interfaces.clone()
            };
            let outcome = NetworkMutator::new(&ctx)
                .apply_privacy_all(*enable, *reload, &selection)
                .await;
            print_json(&outcome)
        }
        Command::Reload { ifaces } => print_json(&NetworkMutator::new(&ctx).force_reload(ifaces).await),
        Command::Tunnel { action } => match action {
            TunnelAction::Create { mtu } => {
                let local = outbound_ipv4_address(&ctx).await.ok_or_else(|| {
                    NetError::Precondition("no outbound IPv4 address to derive the 6to4 prefix from".to_string())
                })?;
                let tunnel = SixToFourTunnel::for_endpoint(
                    &config.preferences.tunnel_name,
                    local,
                    mtu.unwrap_or(config.preferences.tunnel_mtu),
                );
                print_json(&NetworkMutator::new(&ctx).create_6to4_tunnel(&tunnel).await?)
            }
            TunnelAction::Delete => {
                NetworkMutator::new(&ctx)
                    .delete_tunnel(&config.preferences.tunnel_name)
                    .await
            }
        },
        Command::Apply { boot } => {
            let trigger = if *boot { Trigger::Boot } else { Trigger::OnDemand };
            print_json(&apply_preferences(&ctx, &config.preferences, trigger).await)
        }
    }
}

async fn snapshot(ctx: &NetContext<SystemRunner>) -> Snapshot {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    Snapshot {
        hostname,
        timestamp: Utc::now(),
        tool: ctx.ip().to_string(),
        privacy_supported: is_privacy_supported_in_kernel(&ctx.settings().conf_root),
        interfaces: list_interfaces(ctx, None).await.unwrap_or_default(),
        ipv4_routes: list_routes(ctx, false).await,
        ipv6_routes: list_routes(ctx, true).await,
        ipv4_default_route: ipv4_default_route(ctx).await,
        outbound_ipv4_address: outbound_ipv4_address(ctx).await,
        ipv6_default_ifaces: ifaces_with_ipv6_default_route(ctx).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), NetError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

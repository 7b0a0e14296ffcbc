use anyhow::Context;
use clap::{Parser, Subcommand};
use pos_print_relay::config::AppConfig;
use pos_print_relay::escpos::{parse_escpos, PaperWidth};
use pos_print_relay::receipt::render_all;
use pos_print_relay::trigger::TriggerPayload;
use pos_print_relay::{api, devices, sentry_init};
use pos_print_relay::{LocalAgent, NetworkProbe, TcpTransport};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "print-relay", version, about)]
struct Cli {
    /// Config file (JSON); defaults to the per-user config directory
    #[arg(short, long, env = "PRINT_RELAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Also write daily-rotated log files here
    #[arg(long, env = "PRINT_RELAY_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Relay {
        /// Listen address, e.g. 0.0.0.0:8086
        #[arg(long, env = "PORT_ADDR")]
        listen: Option<String>,
        /// Origin header that marks the browser frontend
        #[arg(long, env = "FRONTEND_ORIGIN")]
        frontend_origin: Option<String>,
    },
    /// Run the LAN print agent
    Agent {
        #[arg(long, env = "RELAY_URL")]
        relay_url: Option<String>,
        #[arg(long, env = "PRINTER_HOST")]
        printer_host: Option<String>,
        #[arg(long, env = "PRINTER_PORT")]
        printer_port: Option<u16>,
    },
    /// Render the configured documents and print them as text
    Preview {
        /// Trigger payload to render instead of the sample order
        #[arg(long)]
        items: Option<String>,
        /// 58mm or 80mm
        #[arg(long)]
        paper: Option<PaperWidth>,
    },
    /// List attached USB devices as JSON
    Devices,
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "print-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .with(sentry_tracing::layer())
        .init();

    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.log_dir.as_ref());
    let _sentry_guard = sentry_init::init();

    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Relay {
            listen,
            frontend_origin,
        } => {
            if let Some(listen) = listen {
                config.relay.listen_addr = listen;
            }
            if let Some(origin) = frontend_origin {
                config.relay.frontend_origin = origin;
            }

            info!("POS print relay v{} starting", env!("CARGO_PKG_VERSION"));
            api::start_relay_server(&config.relay).await?;
        }
        Command::Agent {
            relay_url,
            printer_host,
            printer_port,
        } => {
            if let Some(url) = relay_url {
                config.agent.relay_url = url;
            }
            if let Some(host) = printer_host {
                config.agent.printer.host = host;
            }
            if let Some(port) = printer_port {
                config.agent.print_port = port;
            }
            config.agent.validate()?;

            info!("POS print agent v{} starting", env!("CARGO_PKG_VERSION"));
            let prober = NetworkProbe::new(config.agent.probe_timeouts, config.agent.snmp_community.clone());
            LocalAgent::new(&config.agent, prober, TcpTransport::new())
                .run()
                .await;
        }
        Command::Preview { items, paper } => {
            let paper_width = paper.unwrap_or(config.agent.paper_width);
            let payload = items
                .as_deref()
                .map(TriggerPayload::parse)
                .unwrap_or(TriggerPayload::Sentinel);
            if items.is_some() && payload == TriggerPayload::Sentinel {
                warn!("No valid items in payload, previewing the sample order");
            }

            let order = payload.into_order();
            let documents = config.agent.documents.build(&order, &config.agent.store);
            for stream in render_all(&documents, paper_width) {
                println!("{}", parse_escpos(&stream, paper_width).to_text());
            }
        }
        Command::Devices => {
            let list = devices::list_usb_devices()?;
            println!("{}", serde_json::to_string_pretty(&list)?);
        }
    }

    Ok(())
}

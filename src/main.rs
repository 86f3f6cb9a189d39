use clap::Parser;
use serial_relay::device::serial::list_ports;
use serial_relay::utils::{logger, validation::Validate};
use serial_relay::{open_device, server, spawn_relay, CliArgs, RelayError, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.list_ports {
        return print_ports();
    }

    let settings = match Settings::load(&args) {
        Ok(settings) => settings,
        Err(e) => exit_with(&e),
    };

    // 初始化日誌
    logger::init_logger(settings.logging.verbose, settings.logging.format);

    tracing::info!("Starting serial-relay");
    tracing::debug!("Settings: {:?}", settings);

    // 驗證配置
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    let (device, events) = match open_device(&settings.device).await {
        Ok(opened) => opened,
        Err(e) => {
            tracing::error!("❌ {}", e);
            exit_with(&e);
        }
    };

    let (relay, relay_task) = spawn_relay(device, events, settings.relay_options());

    let addr = match settings.bind_address() {
        Ok(addr) => addr,
        Err(e) => exit_with(&e),
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            let e = RelayError::from(e);
            tracing::error!("❌ Cannot bind {}: {}", addr, e);
            exit_with(&e);
        }
    };

    if let Err(e) = server::serve(listener, relay, shutdown_signal()).await {
        tracing::error!("❌ Server failed: {}", e);
        exit_with(&e);
    }

    // upgraded sockets outlive the drain and still hold relay handles
    relay_task.abort();
    tracing::info!("👋 serial-relay stopped");

    Ok(())
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

fn exit_with(error: &RelayError) -> ! {
    tracing::error!("💡 Suggestion: {}", error.recovery_suggestion());
    eprintln!("❌ {}", error.user_friendly_message());
    eprintln!("💡 {}", error.recovery_suggestion());
    std::process::exit(error.exit_code());
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

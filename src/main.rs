use modemkit::{init_logging, AtCommand, AtManager, ManagerConfig, SerialTransport};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;

    let mut args = std::env::args().skip(1);
    let device = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());
    let command = args.next().unwrap_or_else(|| "AT".to_string());

    let manager = AtManager::new(
        Arc::new(SerialTransport::default()),
        ManagerConfig::default(),
    );
    manager.start(&device, Duration::from_secs(5)).await?;

    let response = manager.send_command(AtCommand::new(command)).await?;
    for line in &response.fragments {
        println!("{}", line);
    }

    manager.stop().await;

    if !response.success {
        anyhow::bail!("command failed");
    }
    Ok(())
}

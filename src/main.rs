use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use envconfig::Envconfig;
use log::{debug, info, warn};

use packet_sniffer::interface;
use packet_sniffer::source::LiveDevice;
use packet_sniffer::{CaptureConfig, LogSink, Pipeline};


#[derive(Envconfig)]
struct Config {
    #[envconfig(from = "PCAP_INTERFACE", default = "en0")]
    pub pcap_interface: String,

    #[envconfig(from = "LOG_PAYLOAD", default = "false")]
    pub log_payload: bool,

    /// 0 captures until Ctrl-C or the device goes away
    #[envconfig(from = "CAPTURE_SECONDS", default = "0")]
    pub capture_seconds: u64,
}


fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::init_from_env()?;
    let capture = CaptureConfig::init_from_env()?;
    let interface_name = std::env::args().nth(1).unwrap_or(config.pcap_interface);

    match interface::lookup(&interface_name) {
        Ok(info) => info.log_summary(),
        Err(e) => warn!("No interface metadata: {}", e),
    }

    let pipeline = Arc::new(Pipeline::new(LiveDevice, LogSink::new(config.log_payload)));
    {
        let pipeline = Arc::clone(&pipeline);
        ctrlc::set_handler(move || {
            info!("Interrupted");
            pipeline.stop();
        })
        .context("cannot install Ctrl-C handler")?;
    }

    pipeline
        .start(&interface_name, &capture)
        .with_context(|| format!("cannot start capture on {}", interface_name))?;

    if config.capture_seconds > 0
        && !pipeline.wait_timeout(Duration::from_secs(config.capture_seconds))
    {
        info!("Capture window of {}s elapsed", config.capture_seconds);
        pipeline.stop();
    }
    let stats = pipeline.wait()?;

    let device = pipeline.device_stats();
    debug!("ps_recv: {}", device.received);
    debug!("ps_drop: {}", device.dropped);
    debug!("ps_ifdrop: {}", device.dropped_by_interface);
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

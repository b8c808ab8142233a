use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, arg};
use log::{debug, error, info, warn};

use pitboard::classifier::{self, DisplayEvent};
use pitboard::config::AppConfig;
use pitboard::notifier::lametric::LaMetricTransport;
use pitboard::notifier::{Coalescer, NotificationClass, NotificationTransport};
use pitboard::PitboardError;
use pitboard::pipeline::DisplayUpdate;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the sim and mirror telemetry to the clock
    Run {
        /// LaMetric Time device's IP address, overrides the config file
        #[arg(short, long)]
        ip: Option<String>,

        /// LaMetric Time device's API key, overrides the config file
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Send a couple of sample notifications to verify the device settings
    Probe {
        #[arg(short, long)]
        ip: Option<String>,

        #[arg(short, long)]
        key: Option<String>,
    },
}

fn load_config(ip: Option<String>, key: Option<String>) -> AppConfig {
    let mut config = AppConfig::from_local_file().unwrap_or_default();
    if let Some(ip) = ip {
        config.device_ip = Some(ip);
    }
    if let Some(key) = key {
        config.api_key = Some(key);
    }
    config
}

fn run(ip: Option<String>, key: Option<String>) -> Result<(), PitboardError> {
    let config = load_config(ip, key);
    // persist CLI overrides the way the settings dialog would
    if let Err(e) = config.save() {
        warn!("could not persist config: {}", e);
    }
    if !config.is_device_configured() {
        warn!("LaMetric device not configured, pass --ip and --key to enable notifications");
    }

    let transport = LaMetricTransport::from_config(&config)?;
    let (display_tx, display_rx) = mpsc::channel::<DisplayUpdate>();

    let running = Arc::new(AtomicBool::new(true));
    let running_in_handler = running.clone();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        running_in_handler.store(false, Ordering::Relaxed);
    })
    .expect("Could not set Ctrl-C handler");

    #[cfg(windows)]
    {
        use pitboard::pipeline::Pipeline;
        use pitboard::telemetry::producer::IRacingTelemetrySource;

        thread::spawn(move || {
            let source = IRacingTelemetrySource::default();
            Pipeline::new(source, transport, config, display_tx).run(running);
        });
    }

    #[cfg(not(windows))]
    {
        error!("live telemetry needs the iRacing shared-memory interface and only runs on Windows");
        let _ = (transport, running);
        drop(display_tx);
    }

    info!("STATUS: {}", pitboard::pipeline::STATUS_WAITING);
    // drain until the pipeline thread drops its sender
    for update in display_rx {
        match update {
            DisplayUpdate::Status { message, .. } => info!("STATUS: {}", message),
            DisplayUpdate::Field { field, text } => debug!("{:?}: {}", field, text),
        }
    }
    Ok(())
}

fn probe(ip: Option<String>, key: Option<String>) -> Result<(), PitboardError> {
    let config = load_config(ip, key);
    if !config.is_device_configured() {
        return Err(PitboardError::DeviceNotConfigured);
    }

    let mut transport = LaMetricTransport::from_config(&config)?;
    match transport.queued() {
        Ok(queued) => {
            info!("{} notification(s) queued on the device", queued.len());
            for entry in &queued {
                debug!("queued: {:?}", entry);
            }
        }
        Err(e) => warn!("could not list queued notifications: {}", e),
    }

    let mut coalescer = Coalescer::new();

    let driver = pitboard::Driver {
        i_rating: 5429,
        license_class: "A".to_string(),
        safety_rating: 4.11,
        ..Default::default()
    };
    info!("sending sample ratings notification");
    coalescer.publish(
        classifier::rating_event(&driver).frames(),
        NotificationClass::Ratings,
        &mut transport,
    );

    thread::sleep(Duration::from_secs(3));

    let green = classifier::FLAG_TABLE
        .iter()
        .find(|flag| flag.name == "green")
        .expect("flag table always carries the green flag");
    info!("sending sample {} flag notification", green.name);
    coalescer.publish(
        DisplayEvent::Flag(green).frames(),
        NotificationClass::Flags,
        &mut transport,
    );

    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    let result = match cli.command {
        Commands::Run { ip, key } => run(ip, key),
        Commands::Probe { ip, key } => probe(ip, key),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

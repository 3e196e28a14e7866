use door_sup::{
    cli,
    common::{self, Config, DevMode},
    core::{DoorLockHandler, NotificationSink},
    notify::{LogNotifier, MqttNotifier},
    service::FaceServiceClient,
    storage::{JsonlAccessLog, PinStore, UserStore},
};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "doorsup")]
#[command(about = "Face and PIN door lock controller")]
struct Cli {
    /// Enable development mode (keeps data under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to door-lock.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the door controller with the interactive command loop
    Run,
    /// Inspect the access log
    Logs {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Manage authorized PINs
    Pins {
        #[command(subcommand)]
        command: PinCommands,
    },
    /// Manage users allowed in by face
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Most recent access attempts
    Recent {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Unauthorized access attempts
    Unauthorized {
        /// Only attempts since midnight
        #[arg(long)]
        today: bool,
    },
}

#[derive(Subcommand)]
enum PinCommands {
    List,
    Add { pin: String },
    Remove { pin: String },
}

#[derive(Subcommand)]
enum UserCommands {
    List,
    Add { name: String },
    Remove { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config_path = common::resolve_config_file(cli.config.as_deref(), &dev_mode);
    let config = Config::load_or_default(&config_path)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config, &config_path, &dev_mode)?,
        Commands::Logs { command } => {
            let data_dir = common::resolve_data_dir(&config, &dev_mode)?;
            let log = JsonlAccessLog::new(&data_dir)?;
            let mut stdout = io::stdout();
            match command {
                LogCommands::Recent { limit } => {
                    let records = log.recent(limit)?;
                    cli::print_access_records(&mut stdout, "Recent Access Attempts", &records)?;
                }
                LogCommands::Unauthorized { today } => {
                    let since = if today {
                        Local::now()
                            .date_naive()
                            .and_hms_opt(0, 0, 0)
                            .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
                    } else {
                        None
                    };
                    let records = log.unauthorized_since(since)?;
                    let title = if today {
                        "Unauthorized Attempts Today"
                    } else {
                        "Unauthorized Attempts"
                    };
                    cli::print_access_records(&mut stdout, title, &records)?;
                }
            }
        }
        Commands::Pins { command } => {
            let pin_file = common::resolve_store_file(&config_path, &config.pins.file);
            let mut store = PinStore::load(&pin_file)?;
            match command {
                PinCommands::List => {
                    for pin in store.list() {
                        println!("{}", pin);
                    }
                }
                PinCommands::Add { pin } => {
                    if store.add(&pin)? {
                        store.save()?;
                        println!("PIN added");
                    }
                }
                PinCommands::Remove { pin } => {
                    if store.remove(&pin) {
                        store.save()?;
                        println!("PIN removed");
                    } else {
                        println!("PIN not found");
                    }
                }
            }
        }
        Commands::Users { command } => {
            let user_file = common::resolve_store_file(&config_path, &config.users.file);
            let mut store = UserStore::load(&user_file)?;
            match command {
                UserCommands::List => {
                    for name in store.list() {
                        println!("{}", name);
                    }
                }
                UserCommands::Add { name } => {
                    if store.add(&name)? {
                        store.save()?;
                        println!("User {} authorized", name);
                    }
                }
                UserCommands::Remove { name } => {
                    if store.remove(&name) {
                        store.save()?;
                        println!("User {} removed", name);
                    } else {
                        println!("User not found");
                    }
                }
            }
        }
    }

    Ok(())
}

fn run(config: &Config, config_path: &Path, dev_mode: &DevMode) -> Result<()> {
    let data_dir = common::resolve_data_dir(config, dev_mode)?;
    let access_log = Arc::new(
        JsonlAccessLog::new(&data_dir)
            .with_context(|| format!("Failed to open access log in {}", data_dir.display()))?,
    );
    let pins = Arc::new(PinStore::load_or_empty(&common::resolve_store_file(
        config_path,
        &config.pins.file,
    )));
    let users = Arc::new(UserStore::load_or_empty(&common::resolve_store_file(
        config_path,
        &config.users.file,
    )));

    let mqtt = if config.mqtt.enabled {
        match MqttNotifier::connect(&config.mqtt) {
            Ok(notifier) => Some(Arc::new(notifier)),
            Err(e) => {
                tracing::warn!("[MQTT] Notifications disabled: {}", e);
                None
            }
        }
    } else {
        None
    };
    let notifier: Arc<dyn NotificationSink> = match &mqtt {
        Some(mqtt) => Arc::clone(mqtt) as Arc<dyn NotificationSink>,
        None => Arc::new(LogNotifier),
    };

    let handler = Arc::new(DoorLockHandler::new(config.lock.clone(), pins, notifier, access_log));
    let authenticator =
        FaceServiceClient::new(&config.face_service)?.with_authorized_users(users);
    handler.start(Box::new(authenticator), config.poll.clone())?;

    // Ctrl-C takes the same shutdown path as `exit`.
    {
        let handler = Arc::clone(&handler);
        let mqtt = mqtt.clone();
        let join_timeout = config.poll.join_timeout();
        ctrlc::set_handler(move || {
            tracing::info!("Interrupted");
            shutdown(&handler, mqtt.as_deref(), join_timeout);
            std::process::exit(0);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let stdin = io::stdin();
    let result = cli::run_command_loop(&handler, stdin.lock(), &mut io::stdout());

    shutdown(&handler, mqtt.as_deref(), config.poll.join_timeout());
    Ok(result?)
}

fn shutdown(handler: &DoorLockHandler, mqtt: Option<&MqttNotifier>, join_timeout: Duration) {
    handler.stop();
    if let Some(mqtt) = mqtt {
        mqtt.shutdown(join_timeout);
    }
    println!("\nDoor control system stopped");
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(io::stderr)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

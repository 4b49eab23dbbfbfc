use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use simdesk_core::{record, Endpoint, MetaEntry, TypeTag, UiHint};
use simdesk_runner::{LogRelay, Supervisor, SupervisorConfig};
use simdesk_store::device::{self, record_file_name};
use simdesk_store::{DeviceStore, Profile, ProfileStore, TemplateRegistry, BUILTIN_TEMPLATE_NAME};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const DRAIN_PERIOD: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "simdesk")]
#[command(about = "Manage snmprec device records and run the SNMP agent simulator", long_about = None)]
struct Cli {
    /// Directory holding the .snmprec record files
    #[arg(long, default_value = ".", global = true)]
    dir: PathBuf,
    /// Template registry file
    #[arg(long, default_value = "templates.json", global = true)]
    registry: PathBuf,
    /// Saved launch profiles file
    #[arg(long, default_value = "profiles.json", global = true)]
    profiles: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices in the data directory
    List,
    /// Show one device's records and metadata
    Show { device: String },
    /// Create a device from a template
    New {
        device: String,
        #[arg(long, default_value = BUILTIN_TEMPLATE_NAME)]
        template: String,
    },
    /// List available templates
    Templates,
    /// Save a device's current state as a template
    SaveTemplate { device: String, name: String },
    /// Remove a template from the registry
    RmTemplate { name: String },
    /// Add a record (fails on a duplicate OID)
    Add {
        device: String,
        oid: String,
        /// snmprec numeric type tag (2, 4, 64, 65, 66, 67, ...)
        tag: String,
        value: String,
        #[arg(long)]
        label: Option<String>,
        /// Control hint: "Text Entry", "Slider" or "Toggle"
        #[arg(long)]
        ui: Option<String>,
    },
    /// Update a record's value
    Set { device: String, oid: String, value: String },
    /// Update a record's label and control hint
    Meta {
        device: String,
        oid: String,
        #[arg(long, default_value = "")]
        label: String,
        #[arg(long, default_value = "Text Entry")]
        ui: String,
    },
    /// Remove a record
    Rm { device: String, oid: String },
    /// Set the device's display name (the sysName record)
    SetName { device: String, value: String },
    /// Rename a device's community string (moves both files)
    Rename { device: String, new_name: String },
    /// Duplicate a device's record file (metadata starts fresh)
    Dup { device: String, new_name: String },
    /// Delete a device and its sidecar
    Delete { device: String },
    /// Manage launch profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },
    /// Run the simulator and stream its console output
    Run {
        /// Launch with a saved profile's data dir and endpoint
        #[arg(long)]
        profile: Option<String>,
        /// Bind endpoint, host:port
        #[arg(long)]
        endpoint: Option<String>,
        /// Simulator executable
        #[arg(long, default_value = "snmpsim-command-responder")]
        program: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    List,
    Save {
        name: String,
        #[arg(long)]
        ip: String,
        #[arg(long)]
        port: String,
    },
    Rm { name: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => {
            for path in device::list_devices(&cli.dir)? {
                let store = DeviceStore::open(&path)?;
                let name = store.sys_name().unwrap_or("(no sysName)");
                println!("{:<24} {}", store.community(), name);
            }
        }
        Commands::Show { device } => {
            let store = open_device(&cli.dir, &device)?;
            match store.sys_name() {
                Some(name) => println!("{} ({name})", store.community()),
                // The UI offers creating sysName instead of assuming one.
                None => println!("{} (no sysName, use set-name)", store.community()),
            }
            for record in store.records() {
                let meta = store.meta_for(&record.oid);
                let label = if meta.name.is_empty() {
                    record.oid.clone()
                } else {
                    meta.name.clone()
                };
                println!(
                    "  {:<28} {:<14} {:<12} {}",
                    record.oid,
                    record.tag.label(),
                    meta.ui_hint,
                    label_value(&label, &record.value)
                );
            }
        }
        Commands::New { device, template } => {
            let registry = TemplateRegistry::open(&cli.registry);
            let store = registry.instantiate(&template, &device, &cli.dir)?;
            println!("created {}", store.path().display());
        }
        Commands::Templates => {
            let registry = TemplateRegistry::open(&cli.registry);
            for name in registry.names() {
                println!("{name}");
            }
        }
        Commands::SaveTemplate { device, name } => {
            let store = open_device(&cli.dir, &device)?;
            let mut registry = TemplateRegistry::open(&cli.registry);
            registry.save_as_template(&name, &store)?;
            println!("saved template {name:?}");
        }
        Commands::RmTemplate { name } => {
            let mut registry = TemplateRegistry::open(&cli.registry);
            registry.remove_template(&name)?;
            println!("removed template {name:?}");
        }
        Commands::Add {
            device,
            oid,
            tag,
            value,
            label,
            ui,
        } => {
            if !record::is_valid_oid(&oid) {
                bail!("not a valid OID: {oid}");
            }
            let mut store = open_device(&cli.dir, &device)?;
            let tag = TypeTag::from(tag.as_str());
            let hint: UiHint = ui.as_deref().unwrap_or_default().parse().unwrap_or_default();
            if !hint.applies_to(&tag) {
                bail!("{hint} does not apply to type {}", tag.label());
            }
            store.add(&oid, tag, value)?;
            if label.is_some() || hint != UiHint::default() {
                store.update_meta(&oid, MetaEntry::new(label.unwrap_or_default(), hint))?;
            }
            store.save()?;
        }
        Commands::Set { device, oid, value } => {
            let mut store = open_device(&cli.dir, &device)?;
            store.update_value(&oid, value)?;
            store.save()?;
        }
        Commands::Meta { device, oid, label, ui } => {
            let mut store = open_device(&cli.dir, &device)?;
            let hint: UiHint = ui.parse().unwrap_or_default();
            store.update_meta(&oid, MetaEntry::new(label, hint))?;
            store.save()?;
        }
        Commands::Rm { device, oid } => {
            let mut store = open_device(&cli.dir, &device)?;
            store.remove(&oid)?;
            store.save()?;
        }
        Commands::SetName { device, value } => {
            let mut store = open_device(&cli.dir, &device)?;
            store.set_sys_name(value)?;
            store.save()?;
        }
        Commands::Rename { device, new_name } => {
            let mut store = open_device(&cli.dir, &device)?;
            let new_path = store.rename_community(&new_name)?;
            println!("renamed to {}", new_path.display());
        }
        Commands::Dup { device, new_name } => {
            let store = open_device(&cli.dir, &device)?;
            let new_path = store.duplicate(&new_name)?;
            println!("duplicated to {}", new_path.display());
        }
        Commands::Delete { device } => {
            let store = open_device(&cli.dir, &device)?;
            store.delete()?;
            println!("deleted {device}");
        }
        Commands::Profile { action } => {
            let mut profiles = ProfileStore::open(&cli.profiles);
            match action {
                ProfileCommands::List => {
                    for name in profiles.names() {
                        let profile = profiles.get(&name).expect("listed profile exists");
                        println!(
                            "{:<16} {} {}:{}",
                            name,
                            profile.data_dir.display(),
                            profile.ip,
                            profile.port
                        );
                    }
                }
                ProfileCommands::Save { name, ip, port } => {
                    let profile = Profile {
                        data_dir: cli.dir.clone(),
                        ip,
                        port,
                    };
                    // Reject unusable settings before they reach disk.
                    profile.endpoint()?;
                    profiles.save_profile(&name, profile)?;
                    println!("saved profile {name:?}");
                }
                ProfileCommands::Rm { name } => {
                    profiles.remove_profile(&name)?;
                    println!("removed profile {name:?}");
                }
            }
        }
        Commands::Run {
            profile,
            endpoint,
            program,
        } => {
            let (data_dir, endpoint) = match (profile, endpoint) {
                (Some(name), _) => {
                    let profiles = ProfileStore::open(&cli.profiles);
                    let profile = profiles
                        .get(&name)
                        .with_context(|| format!("no profile named {name:?}"))?;
                    (profile.data_dir.clone(), profile.endpoint()?)
                }
                (None, Some(endpoint)) => (cli.dir.clone(), endpoint.parse::<Endpoint>()?),
                (None, None) => bail!("pass --endpoint host:port or --profile NAME"),
            };
            if !data_dir.is_dir() {
                bail!("data directory does not exist: {}", data_dir.display());
            }
            run_simulator(program, &endpoint, data_dir)?;
        }
    }
    Ok(())
}

fn open_device(dir: &std::path::Path, device: &str) -> Result<DeviceStore> {
    let path = dir.join(record_file_name(device));
    Ok(DeviceStore::open(path)?)
}

fn label_value(label: &str, value: &str) -> String {
    format!("{label} = {value}")
}

/// Start the simulator, drain the relay every 100 ms onto stdout, stop on
/// ctrl-c or when the child exits on its own.
fn run_simulator(program: PathBuf, endpoint: &Endpoint, data_dir: PathBuf) -> Result<()> {
    let relay = LogRelay::new();
    let mut supervisor = Supervisor::new(
        SupervisorConfig {
            program,
            ..SupervisorConfig::default()
        },
        relay.sender(),
    );
    supervisor.start(endpoint, &data_dir)?;
    println!("simulator running on {endpoint}, ctrl-c to stop");

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install ctrl-c handler")?;

    loop {
        for line in relay.drain() {
            println!("[{}] {}", line.stream, line.text);
        }
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        if !supervisor.is_running() {
            println!("simulator exited");
            break;
        }
        thread::sleep(DRAIN_PERIOD);
    }

    supervisor.stop();
    for line in relay.drain() {
        println!("[{}] {}", line.stream, line.text);
    }
    Ok(())
}

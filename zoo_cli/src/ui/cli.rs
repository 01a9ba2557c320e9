use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use log::{debug, info};
use tokio::sync::broadcast;
use zoo_core::storage::{JsonFilePersistence, KeyringSecrets};
use zoo_core::utils::logging::init_logging;
use zoo_core::{
    ConnectionBroker, ProfileDraft, ProfileEvent, ProfileManager, ProfileState, ProfileStore,
    Settings,
};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "zoo", version, subcommand_required = true)]
pub struct Args {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the profile files; overrides the settings file
    #[arg(long, global = true)]
    pub profiles_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List saved profiles
    List,
    /// Save a new profile
    Add {
        /// Coordination-service address, host:port
        server: String,
        #[command(flatten)]
        fields: ProfileFields,
    },
    /// Change an existing profile (the address itself cannot change)
    Edit {
        server: String,
        #[command(flatten)]
        fields: ProfileFields,
        /// Turn the SSH tunnel off, keeping its stored values
        #[arg(long, conflicts_with = "ssh_server")]
        no_ssh: bool,
    },
    /// Delete a profile
    Remove { server: String },
    /// Connect and stay connected until the server goes away or Ctrl+C
    Connect { server: String },
}

#[derive(ClapArgs, Debug, Default)]
pub struct ProfileFields {
    /// SSH server, host:port; enables the tunnel
    #[arg(long)]
    pub ssh_server: Option<String>,
    /// Username for SSH authentication
    #[arg(long)]
    pub ssh_username: Option<String>,
    /// Password for SSH authentication
    #[arg(long)]
    pub ssh_password: Option<String>,
    /// Target reached through the tunnel, host:port
    #[arg(long)]
    pub remote_server: Option<String>,
    /// ACL entry scheme:id:permissions; repeat for more
    #[arg(long = "acl")]
    pub acl: Vec<String>,
}

impl ProfileFields {
    fn apply(self, draft: &mut ProfileDraft) {
        if let Some(ssh_server) = self.ssh_server {
            draft.ssh_enabled = true;
            draft.ssh_server = ssh_server;
        }
        if let Some(username) = self.ssh_username {
            draft.ssh_username = username;
        }
        if let Some(password) = self.ssh_password {
            draft.ssh_password = password;
        }
        if let Some(remote) = self.remote_server {
            draft.remote_server = remote;
        }
        if !self.acl.is_empty() {
            draft.acl_text = self.acl.join("\n");
        }
    }
}

pub async fn run_cli(args: Args) -> anyhow::Result<()> {
    let settings_path = match args.config {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load(&settings_path)?;
    init_logging(&settings.log_level);
    debug!("Using settings from {:?}", settings_path);

    let mut manager = build_manager(&settings, args.profiles_dir)?;

    match args.command {
        Command::List => list_profiles(&manager),
        Command::Add { server, fields } => {
            let mut draft = ProfileDraft::new(server);
            fields.apply(&mut draft);
            let profile = manager.save(&draft)?;
            println!("save success: {}", profile.id());
        }
        Command::Edit {
            server,
            fields,
            no_ssh,
        } => {
            let existing = manager
                .store()
                .get(&server)
                .with_context(|| format!("no profile with id '{server}'"))?;
            let mut draft = ProfileDraft::from_profile(existing);
            fields.apply(&mut draft);
            if no_ssh {
                draft.ssh_enabled = false;
            }
            manager.save(&draft)?;
            println!("save success: {server}");
        }
        Command::Remove { server } => {
            manager.delete(&server)?;
            println!("removed {server}");
        }
        Command::Connect { server } => run_connect(&mut manager, &server).await?,
    }
    Ok(())
}

fn build_manager(
    settings: &Settings,
    profiles_dir: Option<PathBuf>,
) -> anyhow::Result<ProfileManager> {
    let dir = match profiles_dir {
        Some(dir) => dir,
        None => settings.profiles_dir()?,
    };
    let mut persistence = JsonFilePersistence::in_dir(&dir)
        .with_context(|| format!("cannot use profile directory {dir:?}"))?;
    if settings.use_keyring {
        persistence = persistence.with_keyring(KeyringSecrets::default());
    }
    let store = ProfileStore::load(Box::new(persistence))?;
    let broker = ConnectionBroker::with_default_collaborators(settings.connect_timeout());
    Ok(ProfileManager::new(store, broker))
}

fn list_profiles(manager: &ProfileManager) {
    let profiles = manager.profiles();
    if profiles.is_empty() {
        println!("no profiles saved");
        return;
    }
    for (profile, state) in profiles {
        let via = if profile.ssh_enabled {
            format!(" via ssh {} -> {}", profile.ssh_server, profile.remote_server)
        } else {
            String::new()
        };
        println!("{:<32} {:<10}{}", profile.id(), format!("{state:?}"), via);
        for acl in &profile.acl {
            println!("    acl {acl}");
        }
    }
}

/// Connects, then keeps applying lifecycle events until the profile drops
/// back to `Saved` or the user presses Ctrl+C.
async fn run_connect(manager: &mut ProfileManager, server: &str) -> anyhow::Result<()> {
    let mut events = manager.subscribe();
    manager.connect(server)?;
    print_events(&mut events);

    let state = manager.wait_settled(server).await;
    print_events(&mut events);
    if state? != ProfileState::Connected {
        bail!("{server} did not connect");
    }
    info!("Connected. Press Ctrl+C to disconnect.");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let interrupted = tokio::select! {
            _ = &mut ctrl_c => true,
            outcome = manager.process_next() => {
                outcome?;
                false
            }
        };
        if interrupted {
            manager.disconnect(server).await?;
        }
        print_events(&mut events);
        if manager.state(server) != Some(ProfileState::Connected) {
            break;
        }
    }
    manager.broker().close_all().await;
    Ok(())
}

fn print_events(events: &mut broadcast::Receiver<ProfileEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            ProfileEvent::StateChanged { id, state } => println!("{id}: {state:?}"),
            ProfileEvent::Removed { id } => println!("{id}: removed"),
            ProfileEvent::ConnectFailed { id, reason } => println!("{id}: {reason}"),
        }
    }
}

use std::process::ExitCode;

use anyhow::Context;
use drivesync_core::DriveClient;
use drivesync_core::auth::ServiceAccountKey;
use drivesyncd::config::Settings;
use drivesyncd::fs::LocalFs;
use drivesyncd::logger;
use drivesyncd::sync::cleanup::run_interactive_cleanup;
use drivesyncd::sync::clock::SystemClock;
use drivesyncd::sync::reconciler::Reconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    Run,
    Debug,
    List(Option<String>),
    Delete,
    Unknown(String),
}

fn parse_cli_mode<I>(args: I) -> CliMode
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter().skip(1);
    match args.next().as_deref() {
        None => CliMode::Run,
        Some("debug") => CliMode::Debug,
        Some("list") => CliMode::List(args.next()),
        Some("delete") => CliMode::Delete,
        Some(other) => CliMode::Unknown(other.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let mode = parse_cli_mode(std::env::args());
    if let CliMode::Unknown(arg) = &mode {
        println!("unknown arg {arg}");
        return Ok(ExitCode::from(1));
    }
    if mode != CliMode::Run {
        logger::enable_verbose();
    }

    let settings = Settings::from_env().context("failed to load configuration")?;
    let key = ServiceAccountKey::load(&settings.service_account_path())
        .context("failed to load service account credentials")?;
    let api_key = settings.api_key().context("failed to load api key")?;
    let client = DriveClient::new(key, api_key)?;
    println!("these are our starting base folders: {:?}", settings.base_folders);

    match mode {
        CliMode::List(folder_id) => {
            list_remote_items(&client, folder_id.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        CliMode::Delete => {
            run_interactive_cleanup(&client, &settings.base_folders).await?;
            Ok(ExitCode::SUCCESS)
        }
        CliMode::Run | CliMode::Debug => {
            let mut reconciler = Reconciler::new(
                client,
                LocalFs,
                SystemClock,
                settings.base_folders.clone(),
                settings.cadence,
            );
            reconciler.run_forever().await;
            Ok(ExitCode::SUCCESS)
        }
        CliMode::Unknown(_) => Ok(ExitCode::from(1)),
    }
}

/// CLI `list`: a folder id lists that folder's children, no argument lists
/// everything the daemon identity can see.
async fn list_remote_items(client: &DriveClient, folder_id: Option<&str>) -> anyhow::Result<()> {
    let items = match folder_id {
        Some(id) => client.list_children(id).await?,
        None => client.list_owned().await?,
    };
    for item in items {
        println!(
            "{}  {}  {}  {}",
            item.id, item.mime_type, item.modified_time, item.name
        );
    }
    Ok(())
}

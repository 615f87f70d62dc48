//! ims - a command line tab for the IMS web app.
//!
//! Each invocation behaves like one browser tab of the profile stored in the
//! data dir: it shares the bearer token and push bookkeeping with other
//! invocations, and `--follow` joins the leader election for live updates.

use std::path::PathBuf;

use {
    anyhow::{Context, Result, bail},
    clap::{Parser, Subcommand, ValueEnum},
    ims_client::{ClientOptions, ImsClient},
    ims_config::ImsConfig,
    ims_pages::{EntityPage, EntityTable, FieldControl, Tab, TableChange},
    ims_protocol::{FieldReport, Incident, Record, Stay},
    secrecy::{ExposeSecret, SecretString},
    serde_json::Value,
    tracing::{info, warn},
};

mod logging;
mod profile;

#[derive(Parser, Debug)]
#[command(name = "ims", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ./ims.toml, then the user config dir)
    #[arg(short, long, env = "IMS_CONFIG")]
    config: Option<PathBuf>,

    /// Server base URL, overriding the config file
    #[arg(long, env = "IMS_SERVER_URL")]
    server: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Kind {
    Incident,
    FieldReport,
    Stay,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session in the profile
    Login {
        #[arg(long, env = "IMS_USER")]
        user: String,
        #[arg(long, env = "IMS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// List events
    Events,
    /// Print a record, optionally following live updates
    Show {
        kind: Kind,
        event: String,
        number: u64,
        #[arg(long)]
        follow: bool,
    },
    /// Set one field of a record, e.g. `location.name "Center Camp"`
    Edit {
        kind: Kind,
        event: String,
        number: u64,
        path: String,
        /// JSON value; anything that does not parse is sent as a string
        value: String,
    },
    /// Create a record from `path=value` assignments
    Create {
        kind: Kind,
        event: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Append a report entry
    Note {
        kind: Kind,
        event: String,
        number: u64,
        text: String,
    },
    /// Strike (or restore) a report entry
    Strike {
        kind: Kind,
        event: String,
        number: u64,
        entry: u64,
        #[arg(long)]
        restore: bool,
    },
    /// Attach a field report to an incident, or detach it
    Link {
        event: String,
        field_report: u64,
        /// Incident number; omit to detach
        #[arg(long)]
        incident: Option<u64>,
    },
    /// Print the incidents table using the stored filter and page size
    Table {
        event: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        follow: bool,
    },
}

/// Dispatch on the record kind with a generic function.
macro_rules! with_kind {
    ($kind:expr, $func:ident($($arg:expr),* $(,)?)) => {
        match $kind {
            Kind::Incident => $func::<Incident>($($arg),*).await,
            Kind::FieldReport => $func::<FieldReport>($($arg),*).await,
            Kind::Stay => $func::<Stay>($($arg),*).await,
        }
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = ims_config::discover_and_load(cli.config.as_deref())?;
    if let Some(server) = cli.server.clone() {
        config.server_url = server;
    }
    logging::init(&config.log, cli.json_logs)?;

    run(cli.command, config).await
}

async fn run(command: Command, config: ImsConfig) -> Result<()> {
    let profile = profile::open(&config).context("cannot open the profile")?;
    let options = ClientOptions::new(config.server_url.clone()).with_refresh_margin(
        std::time::Duration::from_secs(config.auth.refresh_margin_secs),
    );
    let client = ImsClient::new(options, std::sync::Arc::clone(&profile.store))?;

    match command {
        Command::Login { user, password } => {
            let password = SecretString::new(password);
            client
                .login(&user, password.expose_secret())
                .await
                .context("login failed")?;
            info!(%user, "logged in");
            Ok(())
        },
        Command::Logout => {
            client.logout()?;
            info!("logged out");
            Ok(())
        },
        Command::Events => {
            for event in client.events().await? {
                println!("{}", event.name);
            }
            Ok(())
        },
        command => {
            let event = command_event(&command).to_string();
            let mut tab = Tab::new(profile, client);
            tab.refresh_auth(Some(&event))
                .await
                .context("cannot read permissions")?;
            let result = run_in_tab(&mut tab, command, &config).await;
            tab.close();
            result
        },
    }
}

fn command_event(command: &Command) -> &str {
    match command {
        Command::Show { event, .. }
        | Command::Edit { event, .. }
        | Command::Create { event, .. }
        | Command::Note { event, .. }
        | Command::Strike { event, .. }
        | Command::Link { event, .. }
        | Command::Table { event, .. } => event,
        Command::Login { .. } | Command::Logout | Command::Events => "",
    }
}

async fn run_in_tab(tab: &mut Tab, command: Command, config: &ImsConfig) -> Result<()> {
    match command {
        Command::Show {
            kind,
            event,
            number,
            follow,
        } => {
            if follow && !tab.start_live_updates(&config.live) {
                warn!("continuing without live updates");
            }
            with_kind!(kind, show(tab, &event, number, follow))
        },
        Command::Edit {
            kind,
            event,
            number,
            path,
            value,
        } => with_kind!(kind, edit(tab, &event, number, &path, parse_value(&value))),
        Command::Create {
            kind,
            event,
            fields,
        } => {
            let fields = fields
                .iter()
                .map(|f| parse_assignment(f.as_str()))
                .collect::<Result<Vec<_>>>()?;
            with_kind!(kind, create(tab, &event, fields))
        },
        Command::Note {
            kind,
            event,
            number,
            text,
        } => with_kind!(kind, note(tab, &event, number, &text)),
        Command::Strike {
            kind,
            event,
            number,
            entry,
            restore,
        } => with_kind!(kind, strike(tab, &event, number, entry, !restore)),
        Command::Link {
            event,
            field_report,
            incident,
        } => {
            let mut page = tab.open::<FieldReport>(&event, field_report).await?;
            page.attach_to_incident(incident).await?;
            print_record(&page)
        },
        Command::Table {
            event,
            page,
            follow,
        } => {
            if follow && !tab.start_live_updates(&config.live) {
                warn!("continuing without live updates");
            }
            table(tab, &event, page, follow).await
        },
        Command::Login { .. } | Command::Logout | Command::Events => Ok(()),
    }
}

/// Interpret a command line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((path, value)) = raw.split_once('=') else {
        bail!("expected path=value, got '{raw}'");
    };
    if path.is_empty() {
        bail!("empty field path in '{raw}'");
    }
    Ok((path.to_string(), parse_value(value)))
}

fn print_record<E: Record>(page: &EntityPage<E>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(page.record())?);
    Ok(())
}

async fn show<E: Record>(tab: &Tab, event: &str, number: u64, follow: bool) -> Result<()> {
    let mut page = tab.open::<E>(event, number).await?;
    print_record(&page)?;
    if !follow {
        return Ok(());
    }
    loop {
        tokio::select! {
            update = page.next_update() => match update {
                Some(Ok(true)) => print_record(&page)?,
                Some(Ok(false)) => {},
                Some(Err(e)) => warn!(error = %e, "reload failed"),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn edit<E: Record>(
    tab: &Tab,
    event: &str,
    number: u64,
    path: &str,
    value: Value,
) -> Result<()> {
    let mut page = tab.open::<E>(event, number).await?;
    let mut control = FieldControl::bind(path, &page.document()?);
    if !page.edit(&mut control, value).await? {
        info!(path, "value unchanged");
    }
    print_record(&page)
}

async fn create<E: Record>(tab: &Tab, event: &str, fields: Vec<(String, Value)>) -> Result<()> {
    let draft: E = serde_json::from_value(serde_json::json!({ "event": event }))?;
    let mut page = tab.new_record(draft)?;
    let mut edits = Value::Object(Default::default());
    for (path, value) in fields {
        ims_pages::forms::merge(&mut edits, ims_pages::forms::nested_edit(&path, value));
    }
    page.submit(edits).await?;
    println!("{}", page.address());
    Ok(())
}

async fn note<E: Record>(tab: &Tab, event: &str, number: u64, text: &str) -> Result<()> {
    let mut page = tab.open::<E>(event, number).await?;
    if !page.add_report_entry(text).await? {
        bail!("report entry text is empty");
    }
    print_record(&page)
}

async fn strike<E: Record>(
    tab: &Tab,
    event: &str,
    number: u64,
    entry: u64,
    stricken: bool,
) -> Result<()> {
    let mut page = tab.open::<E>(event, number).await?;
    page.set_entry_stricken(entry, stricken).await?;
    print_record(&page)
}

async fn table(tab: &Tab, event: &str, index: usize, follow: bool) -> Result<()> {
    let mut table = tab.open_table::<Incident>(event).await?;
    let print = |table: &EntityTable<Incident>| {
        let size = table.page_size();
        for incident in table
            .filtered()
            .into_iter()
            .skip(index * size)
            .take(size)
        {
            println!(
                "{:>5}  {:<10?}  {}",
                incident.number.unwrap_or_default(),
                incident.state,
                incident.summary.as_deref().unwrap_or("")
            );
        }
    };
    print(&table);
    if !follow {
        return Ok(());
    }
    loop {
        tokio::select! {
            update = table.next_update() => match update {
                Some(Ok(TableChange::Unchanged)) => {},
                Some(Ok(_)) => print(&table),
                Some(Err(e)) => warn!(error = %e, "reload failed"),
                None => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

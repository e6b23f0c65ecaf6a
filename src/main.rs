use clap::Parser;
use notebook_sync::api::HttpBackend;
use notebook_sync::app::{SessionStateStore, DEFAULT_WORKSPACE_NAME};
use notebook_sync::config::{Cli, Config};
use notebook_sync::error::Result;
use notebook_sync::event::AppEvent;
use notebook_sync::session::storage::FileStorage;
use notebook_sync::session::{Role, SourceId, WorkspaceId};
use notebook_sync::sync::WsConnector;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

enum Input {
    Line(Option<String>),
    Event(Option<AppEvent>),
}

enum Flow {
    Continue,
    Quit,
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints whatever the transcript gained since the last render. Messages are
/// matched by role and content so a confirmed copy of an optimistic message
/// is not printed twice.
fn render_transcript(store: &SessionStateStore, shown: &mut Vec<(Role, String)>) {
    let current: Vec<(Role, String)> = store
        .transcript()
        .iter()
        .map(|message| (message.role, message.content.clone()))
        .collect();
    let common = shown
        .iter()
        .zip(&current)
        .take_while(|(left, right)| left == right)
        .count();
    if common < shown.len() {
        println!("-- transcript refreshed --");
    }
    for (role, content) in &current[common..] {
        let speaker = match role {
            Role::User => "you",
            Role::Assistant => "notebook",
        };
        println!("{speaker}> {content}");
    }
    *shown = current;
}

fn print_sources(store: &SessionStateStore) {
    if store.sources().is_empty() {
        println!("(no sources)");
    }
    for source in store.sources() {
        let mark = if store.enabled_sources().contains(&source.id) {
            "x"
        } else {
            " "
        };
        println!("[{mark}] {:>4} {}", source.id, source.name);
    }
}

fn print_artifacts(store: &SessionStateStore) {
    if store.artifacts().is_empty() {
        println!("(no artifacts)");
    }
    for artifact in store.artifacts() {
        println!("{:>4} {} (updated {})", artifact.id, artifact.title, artifact.updated_at);
    }
}

async fn print_workspaces(store: &SessionStateStore, team_id: Option<&str>) {
    match store.list_workspaces(team_id).await {
        Ok(workspaces) => {
            for workspace in workspaces {
                let mark = if store.workspace() == Some(&workspace.id) {
                    "*"
                } else {
                    " "
                };
                println!("{mark} {} {}", workspace.id, workspace.name);
            }
        }
        Err(err) => println!("could not list workspaces: {err}"),
    }
}

async fn handle_line(store: &mut SessionStateStore, config: &Config, line: &str) -> Flow {
    let line = line.trim();
    let Some(console) = line.strip_prefix(':') else {
        store.send_with_selection(line);
        return Flow::Continue;
    };

    let (name, arg) = match console.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (console, ""),
    };
    match name {
        "quit" | "q" => return Flow::Quit,
        "sources" => print_sources(store),
        "artifacts" => print_artifacts(store),
        "suggestions" => {
            for question in store.suggestions() {
                println!("? {question}");
            }
        }
        "toggle" => match arg.parse::<SourceId>() {
            Ok(id) => {
                store.toggle_source(id);
                print_sources(store);
            }
            Err(_) => println!("usage: :toggle <source id>"),
        },
        "all" => {
            let known: Vec<SourceId> = store.known_sources().iter().copied().collect();
            store.set_all_sources(&known);
            print_sources(store);
        }
        "none" => {
            store.set_all_sources(&[]);
            print_sources(store);
        }
        "switch" if !arg.is_empty() => store.open(WorkspaceId::from(arg)),
        "workspaces" => print_workspaces(store, config.team.as_deref()).await,
        "create" => {
            let name = if arg.is_empty() {
                DEFAULT_WORKSPACE_NAME
            } else {
                arg
            };
            match store.create_workspace(name, config.team.as_deref()).await {
                Ok(created) => println!("workspace {} ({})", created.id, created.name),
                Err(err) => println!("could not create workspace: {err}"),
            }
        }
        "rename" if !arg.is_empty() => match store.rename_workspace(arg).await {
            Ok(renamed) => println!("renamed to {}", renamed.name),
            Err(err) => println!("could not rename workspace: {err}"),
        },
        "delete" => match store.delete_workspace(config.team.as_deref()).await {
            Ok(Some(next)) => println!("workspace {next}"),
            Ok(None) => {
                println!("no workspaces left");
                return Flow::Quit;
            }
            Err(err) => println!("could not delete workspace: {err}"),
        },
        "recent" => {
            for workspace in store.recent_workspaces() {
                println!("{workspace}");
            }
        }
        _ => println!(
            "console commands: :sources :toggle <id> :all :none :artifacts :suggestions :recent :workspaces :switch <workspace> :create [name] :rename <name> :delete :quit"
        ),
    }
    Flow::Continue
}

async fn run(config: Config) -> Result<()> {
    let backend = Arc::new(HttpBackend::new(
        config.base_url.clone(),
        config.request_timeout,
    )?);
    let connector = Arc::new(WsConnector::new(config.base_url.clone())?);
    let storage = FileStorage::new(config.state_dir.clone())?;
    let mut store = SessionStateStore::new(
        backend,
        connector,
        Box::new(storage),
        config.reconnect_delay,
    );

    let workspace = store
        .open_initial(config.workspace.clone(), config.team.as_deref())
        .await?;
    println!("workspace {workspace}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = Vec::new();
    let mut revision = store.transcript_revision();

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            event = store.next_event() => Input::Event(event),
        };
        match input {
            Input::Line(Some(line)) => {
                if let Flow::Quit = handle_line(&mut store, &config, &line).await {
                    break;
                }
            }
            Input::Line(None) | Input::Event(None) => break,
            Input::Event(Some(event)) => store.apply_event(event),
        }

        if store.transcript_revision() != revision {
            revision = store.transcript_revision();
            render_transcript(&store, &mut shown);
        }
    }

    store.close();
    Ok(())
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().to_config();
    init_tracing(&config.log_filter);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("notebook-sync-runtime")
        .build()?;
    runtime.block_on(run(config))?;
    Ok(())
}

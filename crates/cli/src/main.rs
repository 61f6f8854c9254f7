mod agent;
mod settings;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mirrorchat_store::{MemoryStore, MessageStatus};
use mirrorchat_widget::{ChatSession, MemoryView, SessionCommand, SessionExit, WidgetError};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::agent::EchoAgent;
use crate::settings::{SettingsError, SettingsStore};

const QUIT_COMMAND: &str = "/quit";
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliArgs {
    config_path: Option<PathBuf>,
    save_config: bool,
}

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("settings could not be saved: {source}"))]
    SaveSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("chat session failed: {source}"))]
    Session {
        stage: &'static str,
        source: WidgetError,
    },
}

type CliResult<T> = Result<T, CliError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run().await {
        eprintln!("mirrorchat: {error}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let args = parse_args(env::args().skip(1))?;
    let settings_store = match args.config_path {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::load(),
    };
    let settings = settings_store.settings();

    if args.save_config {
        settings_store
            .update((*settings).clone())
            .context(SaveSettingsSnafu {
                stage: "save-config",
            })?;
        println!("saved settings to {}", settings_store.config_path().display());
        return Ok(());
    }

    let store = MemoryStore::new();
    let agent = tokio::spawn(EchoAgent::new(store.clone(), &settings).run());

    let mut session = ChatSession::open(
        Arc::new(store.clone()),
        MemoryView::new(),
        settings.widget.clone(),
    )
    .context(SessionSnafu {
        stage: "open-session",
    })?;

    let (commands, receiver) = mpsc::unbounded_channel();
    let reader = tokio::spawn(forward_lines(
        BufReader::new(tokio::io::stdin()),
        commands,
        store,
        settings.widget.collection.clone(),
    ));

    println!("type a message and press enter; {QUIT_COMMAND} or end of input exits");
    let exit = session
        .run(receiver, |view, report| {
            if report.rendered() > 0 {
                print!("{}", view.render_transcript());
                println!("---");
            }
        })
        .await
        .context(SessionSnafu {
            stage: "run-session",
        })?;

    reader.abort();
    agent.abort();
    tracing::info!(?exit, "chat session closed");
    if exit == SessionExit::SubscriptionEnded {
        eprintln!("mirrorchat: store subscription ended");
    }
    Ok(())
}

/// Turns input lines into send commands. On end of input it waits until every forwarded
/// message has been stored and answered, then asks the session to shut down.
async fn forward_lines<R>(
    input: R,
    commands: mpsc::UnboundedSender<SessionCommand>,
    store: MemoryStore,
    collection: String,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut forwarded = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim() == QUIT_COMMAND => break,
            Ok(Some(line)) => {
                let blank = line.trim().is_empty();
                if commands.send(SessionCommand::Send(line)).is_err() {
                    return;
                }
                if !blank {
                    forwarded += 1;
                }
            }
            Ok(None) => {
                wait_for_replies(&store, &collection, forwarded).await;
                break;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to read input");
                break;
            }
        }
    }
    let _ = commands.send(SessionCommand::Shutdown);
}

/// Polls until `expected` non-blank messages are stored and none of them is still pending.
async fn wait_for_replies(store: &MemoryStore, collection: &str, expected: usize) {
    loop {
        let documents = store.documents(collection);
        let mut stored = 0;
        let mut outstanding = 0;
        for (_, snapshot) in &documents {
            if snapshot.text().trim().is_empty() {
                continue;
            }
            stored += 1;
            if snapshot.message_status() == Some(MessageStatus::Pending) {
                outstanding += 1;
            }
        }
        if stored >= expected && outstanding == 0 {
            return;
        }
        tracing::trace!(stored, outstanding, expected, "waiting for replies");
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> CliResult<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--config" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-config-value",
                    arg: "--config",
                })?;
                parsed.config_path = Some(PathBuf::from(value));
            }
            "--save-config" => parsed.save_config = true,
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use mirrorchat_store::{MessagePatch, NewMessage, Timestamp};

    use crate::settings::CliSettings;

    use super::*;

    fn args(raw: &[&str]) -> CliResult<CliArgs> {
        parse_args(raw.iter().map(|value| value.to_string()))
    }

    #[test]
    fn parses_config_path_and_save_flag() {
        let parsed = args(&["--config", "chat.json", "--save-config"]).unwrap();
        assert_eq!(parsed.config_path, Some(PathBuf::from("chat.json")));
        assert!(parsed.save_config);
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(matches!(
            args(&["--verbose"]),
            Err(CliError::UnknownArgument { .. })
        ));
        assert!(matches!(
            args(&["--config"]),
            Err(CliError::MissingArgumentValue { .. })
        ));
    }

    #[tokio::test]
    async fn waiting_for_replies_returns_once_nothing_is_pending() {
        let store = MemoryStore::new();
        let id = store
            .insert_now("messages", NewMessage::user("hi", Timestamp::from_millis(1)))
            .unwrap();
        store
            .insert_now("messages", NewMessage::user(" ", Timestamp::from_millis(2)))
            .unwrap();
        store
            .update("messages", &id, &MessagePatch::replied("hello"))
            .unwrap();

        tokio::time::timeout(
            Duration::from_secs(1),
            wait_for_replies(&store, "messages", 1),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn waiting_for_replies_holds_until_sends_are_stored() {
        let store = MemoryStore::new();
        let waiting = wait_for_replies(&store, "messages", 1);

        assert!(
            tokio::time::timeout(Duration::from_millis(100), waiting)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn end_of_input_renders_every_reply_before_exiting() {
        let settings = CliSettings {
            agent_delay_ms: 0,
            ..CliSettings::default()
        };
        let store = MemoryStore::new();
        let agent = tokio::spawn(EchoAgent::new(store.clone(), &settings).run());
        let mut session = ChatSession::open(
            Arc::new(store.clone()),
            MemoryView::new(),
            settings.widget.clone(),
        )
        .unwrap();

        let (commands, receiver) = mpsc::unbounded_channel();
        let input: &[u8] = b"hi\n\nthere\n";
        let reader = tokio::spawn(forward_lines(
            input,
            commands,
            store.clone(),
            settings.widget.collection.clone(),
        ));

        let exit = tokio::time::timeout(Duration::from_secs(5), session.run(receiver, |_, _| {}))
            .await
            .unwrap()
            .unwrap();
        reader.await.unwrap();
        agent.abort();

        assert_eq!(exit, SessionExit::Shutdown);
        assert_eq!(
            session.view().render_transcript(),
            "[user] hi\n[assistant] echo: hi\n[user] there\n[assistant] echo: there\n"
        );
    }
}

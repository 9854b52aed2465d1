//! Line-oriented chat front end.
//!
//! Plain lines are sent as messages; lines starting with `/` are commands.
//! Numbers given to `/edit`, `/regen`, `/next` and `/prev` count turns
//! upward from the current one, as printed in square brackets.

use std::io::Write;

use loom_ai::{ChatError, ChatSession, ChatStream, SharedSession, StopReason};
use loom_common::{HistoryEntry, LoomError};
use loom_config::ModelConfigUpdate;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::render;

pub const HELP: &str = "\
commands:
  <text>              send a message
  /edit [N] <text>    branch the user turn N above the current one (default 0)
  /regen [N]          new reply for the assistant turn N above (default 0)
  /next [N], /prev [N] switch branch at the turn N above (default 0)
  /continue           keep writing the current reply
  /history            show the current branch
  /save               save this chat
  /load <id>          open a saved chat
  /list               list saved chats
  /new                save this chat and start another
  /rename <name>      rename and save this chat
  /delete <id>        delete a saved chat
  /reset              start over without saving
  /settings k=v ...   change model_name, generation_length, chunk_size,
                      temperature, top_p or max_context_length
  /usage              token counts for this session
  /help               this text
  /quit               leave
Ctrl-C stops a reply in progress.";

const SETTING_KEYS: [&str; 6] = [
    "model_name",
    "generation_length",
    "chunk_size",
    "temperature",
    "top_p",
    "max_context_length",
];

#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Send(String),
    Edit { distance: usize, text: String },
    Regenerate(usize),
    Navigate { distance: usize, direction: &'static str },
    Continue,
    History,
    Save,
    Load(String),
    List,
    New,
    Rename(String),
    Delete(String),
    Reset,
    Settings(ModelConfigUpdate),
    Usage,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ReplCommand::Send(line.to_string())));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let command = match name {
        "edit" => {
            let (distance, text) = leading_distance(args)?;
            if text.is_empty() {
                return Err("usage: /edit [N] <text>".into());
            }
            ReplCommand::Edit {
                distance,
                text: text.to_string(),
            }
        }
        "regen" => ReplCommand::Regenerate(distance_only(args)?),
        "next" => ReplCommand::Navigate {
            distance: distance_only(args)?,
            direction: "next",
        },
        "prev" => ReplCommand::Navigate {
            distance: distance_only(args)?,
            direction: "prev",
        },
        "continue" => ReplCommand::Continue,
        "history" => ReplCommand::History,
        "save" => ReplCommand::Save,
        "load" => ReplCommand::Load(required(args, "/load <id>")?),
        "list" => ReplCommand::List,
        "new" => ReplCommand::New,
        "rename" => ReplCommand::Rename(required(args, "/rename <name>")?),
        "delete" => ReplCommand::Delete(required(args, "/delete <id>")?),
        "reset" => ReplCommand::Reset,
        "settings" => ReplCommand::Settings(parse_settings(args)?),
        "usage" => ReplCommand::Usage,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command /{other} (try /help)")),
    };
    Ok(Some(command))
}

fn leading_distance(args: &str) -> Result<(usize, &str), String> {
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) if first.chars().all(|c| c.is_ascii_digit()) => first
            .parse()
            .map(|n| (n, rest.trim()))
            .map_err(|e| format!("bad turn number {first:?}: {e}")),
        _ => Ok((0, args)),
    }
}

fn distance_only(args: &str) -> Result<usize, String> {
    if args.is_empty() {
        return Ok(0);
    }
    args.parse()
        .map_err(|_| format!("expected a turn number, got {args:?}"))
}

fn required(args: &str, usage: &str) -> Result<String, String> {
    if args.is_empty() {
        Err(format!("usage: {usage}"))
    } else {
        Ok(args.to_string())
    }
}

fn parse_settings(args: &str) -> Result<ModelConfigUpdate, String> {
    if args.is_empty() {
        return Err("usage: /settings key=value ...".into());
    }
    let mut fields = serde_json::Map::new();
    for pair in args.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {pair:?}"))?;
        if !SETTING_KEYS.contains(&key) {
            return Err(format!("unknown setting {key:?}"));
        }
        let value = if key == "model_name" {
            serde_json::Value::String(value.to_string())
        } else {
            serde_json::from_str(value).map_err(|_| format!("{key} needs a number"))?
        };
        fields.insert(key.to_string(), value);
    }
    serde_json::from_value(serde_json::Value::Object(fields)).map_err(|e| e.to_string())
}

/// Where human-readable output goes. In JSON mode stdout carries events
/// only, so messages go to stderr.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    pub json: bool,
}

impl Console {
    fn say(&self, text: &str) {
        if self.json {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }

    fn show_history(&self, history: &[HistoryEntry]) {
        if !self.json {
            print!("{}", render::history(history));
        }
    }

    fn prompt(&self) {
        if !self.json {
            print!("> ");
            let _ = std::io::stdout().flush();
        }
    }
}

/// Read commands from stdin until `/quit`, end of input or Ctrl-C at the prompt.
pub async fn run(session: SharedSession, console: Console) -> Result<(), LoomError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    console.say("type /help for commands");

    loop {
        console.prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match parse_line(&line) {
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                console.say(&message);
                continue;
            }
        };

        let mut session = session.lock().await;
        if let Err(err) = execute(&mut session, command, console).await {
            session.report_error(&err);
            console.say(&format!("error: {err}"));
        }
    }
    Ok(())
}

async fn execute(
    session: &mut ChatSession,
    command: ReplCommand,
    console: Console,
) -> Result<(), ChatError> {
    match command {
        ReplCommand::Send(text) => stream_reply(session.send_message(&text).await?, console).await,
        ReplCommand::Edit { distance, text } => {
            stream_reply(session.edit(distance, &text).await?, console).await
        }
        ReplCommand::Regenerate(distance) => {
            stream_reply(session.regenerate(distance).await?, console).await
        }
        ReplCommand::Continue => stream_reply(session.continue_generation().await?, console).await,
        ReplCommand::Navigate {
            distance,
            direction,
        } => {
            let outcome = session.navigate(distance, direction).await?;
            match &outcome.rejection {
                Some(rejection) => console.say(&format!("not switched: {rejection}")),
                None => console.show_history(&outcome.history),
            }
            Ok(())
        }
        ReplCommand::History => {
            console.show_history(&session.history().await);
            Ok(())
        }
        ReplCommand::Save => {
            let location = session.save().await?;
            console.say(&format!("saved to {location}"));
            Ok(())
        }
        ReplCommand::Load(id) => {
            let history = session.load(&id).await?;
            console.show_history(&history);
            Ok(())
        }
        ReplCommand::List => {
            let chats = session.list().await?;
            if !console.json {
                print!("{}", render::chat_list(&chats));
            }
            Ok(())
        }
        ReplCommand::New => {
            let id = session.new_chat().await?;
            console.say(&format!("started chat {id}"));
            Ok(())
        }
        ReplCommand::Rename(name) => {
            session.rename(&name).await?;
            console.say(&format!("renamed to {name:?}"));
            Ok(())
        }
        ReplCommand::Delete(id) => {
            session.delete(&id).await?;
            console.say(&format!("deleted {id}"));
            Ok(())
        }
        ReplCommand::Reset => {
            let history = session.reset().await?;
            console.show_history(&history);
            Ok(())
        }
        ReplCommand::Settings(update) => {
            let change = session.update_settings(&update)?;
            if change.reload_required {
                console.say("model changed; restart the engine server with the new model");
            } else if change.changed {
                console.say("settings updated");
            } else {
                console.say("settings unchanged");
            }
            Ok(())
        }
        ReplCommand::Usage => {
            let usage = session.usage().await;
            console.say(&format!(
                "prompt tokens: {}, generated tokens: {}",
                usage.prompt_tokens, usage.generated_tokens
            ));
            Ok(())
        }
        ReplCommand::Help => {
            console.say(HELP);
            Ok(())
        }
        ReplCommand::Quit => Ok(()),
    }
}

/// Print a reply as it streams in. Ctrl-C cancels it.
async fn stream_reply(mut stream: ChatStream, console: Console) -> Result<(), ChatError> {
    let cancel = stream.cancel_token();
    let mut printed = 0;
    let mut started = false;

    loop {
        let snapshot = tokio::select! {
            snapshot = stream.next() => snapshot,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                continue;
            }
        };
        let Some(snapshot) = snapshot else { break };
        if console.json {
            continue;
        }
        if !started {
            if let Some(last) = snapshot.last() {
                println!("{}", render::entry_header(last, 0));
            }
            started = true;
        }
        print!("{}", render::reply_delta(&snapshot, printed));
        let _ = std::io::stdout().flush();
        printed = snapshot.last().map_or(0, |e| e.content.len());
    }

    let report = match stream.finish().await {
        Ok(report) => report,
        Err(err) => {
            // Already published to event subscribers by the stream.
            console.say(&format!("\nerror: {err}"));
            return Ok(());
        }
    };
    debug!(?report, "reply finished");
    if !console.json {
        println!();
        if report.stop == StopReason::Cancelled {
            println!("(stopped)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ReplCommand {
        parse_line(line).unwrap().unwrap()
    }

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(parse("  hello there "), ReplCommand::Send("hello there".into()));
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn edit_with_and_without_distance() {
        assert_eq!(
            parse("/edit 2 What about Paris?"),
            ReplCommand::Edit {
                distance: 2,
                text: "What about Paris?".into()
            }
        );
        assert_eq!(
            parse("/edit Try again"),
            ReplCommand::Edit {
                distance: 0,
                text: "Try again".into()
            }
        );
        assert!(parse_line("/edit").is_err());
    }

    #[test]
    fn navigation_defaults_to_current_turn() {
        assert_eq!(
            parse("/next"),
            ReplCommand::Navigate {
                distance: 0,
                direction: "next"
            }
        );
        assert_eq!(
            parse("/prev 3"),
            ReplCommand::Navigate {
                distance: 3,
                direction: "prev"
            }
        );
        assert_eq!(parse("/regen 1"), ReplCommand::Regenerate(1));
        assert!(parse_line("/regen one").is_err());
    }

    #[test]
    fn argument_commands_require_arguments() {
        assert_eq!(parse("/load abc-123"), ReplCommand::Load("abc-123".into()));
        assert_eq!(parse("/rename Trip plans"), ReplCommand::Rename("Trip plans".into()));
        assert!(parse_line("/load").is_err());
        assert!(parse_line("/delete").is_err());
    }

    #[test]
    fn settings_parse_into_update() {
        let ReplCommand::Settings(update) = parse("/settings temperature=0.2 chunk_size=10")
        else {
            panic!("expected settings");
        };
        assert_eq!(update.temperature, Some(0.2));
        assert_eq!(update.chunk_size, Some(10));
        assert!(update.top_p.is_none());

        let ReplCommand::Settings(update) = parse("/settings model_name=llama-3.2-3b") else {
            panic!("expected settings");
        };
        assert_eq!(update.model_name.as_deref(), Some("llama-3.2-3b"));
    }

    #[test]
    fn settings_reject_unknown_and_malformed() {
        assert!(parse_line("/settings").is_err());
        assert!(parse_line("/settings warmth=1").is_err());
        assert!(parse_line("/settings temperature").is_err());
        assert!(parse_line("/settings temperature=hot").is_err());
        assert!(parse_line("/settings chunk_size=-4").is_err());
    }

    #[test]
    fn unknown_command_is_error() {
        assert!(parse_line("/fly").unwrap_err().contains("/fly"));
        assert_eq!(parse("/quit"), ReplCommand::Quit);
        assert_eq!(parse("/exit"), ReplCommand::Quit);
    }
}

use std::sync::Arc;

use loom_ai::{
    ChatSession, ConversationTree, FileTreeStore, GenerationEngine, LlamaServerConfig,
    LlamaServerEngine, SessionRegistry, TreeStore,
};
use loom_common::{ChatEvent, EventBus, LoomError, SessionId};
use loom_config::LoomConfig;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cli::Command;
use crate::render;
use crate::repl::{self, Console};

const EVENT_CAPACITY: usize = 256;

pub async fn run(command: Command, config: LoomConfig) -> Result<(), LoomError> {
    match command {
        Command::Config => {
            println!("{}", loom_config::config_to_json(&config));
            Ok(())
        }
        Command::List => {
            let store = open_store(&config)?;
            print!("{}", list_chats(&store).await?);
            Ok(())
        }
        Command::Show { id } => {
            let store = open_store(&config)?;
            print!("{}", show_chat(&store, &id).await?);
            Ok(())
        }
        Command::Chat { load, json } => chat(config, load, json).await,
    }
}

fn open_store(config: &LoomConfig) -> Result<FileTreeStore, LoomError> {
    let dir = config.storage.resolve_chats_dir()?;
    tracing::debug!(dir = %dir.display(), "opening chat store");
    Ok(FileTreeStore::new(dir))
}

async fn list_chats(store: &dyn TreeStore) -> Result<String, LoomError> {
    Ok(render::chat_list(&store.list().await?))
}

async fn show_chat(store: &dyn TreeStore, id: &str) -> Result<String, LoomError> {
    let document = store.get(id).await?;
    let tree = ConversationTree::from_document(&document)?;
    Ok(render::history(&tree.history()))
}

async fn chat(config: LoomConfig, load: Option<String>, json: bool) -> Result<(), LoomError> {
    let engine = LlamaServerEngine::connect(LlamaServerConfig::from_config(&config)).await?;
    let engine: Arc<dyn GenerationEngine> = Arc::new(engine);
    let store: Arc<dyn TreeStore> = Arc::new(open_store(&config)?);
    let bus = Arc::new(EventBus::new(EVENT_CAPACITY));
    let printer = json.then(|| print_events(bus.subscribe()));

    let registry = {
        let bus = Arc::clone(&bus);
        SessionRegistry::new(move || {
            ChatSession::new(Arc::clone(&engine), Arc::clone(&store), &config)
                .with_events(Arc::clone(&bus))
        })
    };
    drop(bus);

    let client = SessionId::new();
    let session = registry.get_or_create(&client).await;
    let console = Console { json };

    if let Some(id) = load {
        let history = session.lock().await.load(&id).await?;
        if !json {
            print!("{}", render::history(&history));
        }
    }

    let result = repl::run(session, console).await;

    // Dropping the last session and the registry closes the bus, which
    // lets the printer drain and exit.
    registry.remove(&client).await;
    drop(registry);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    result
}

fn print_events(mut events: broadcast::Receiver<ChatEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("Failed to encode event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

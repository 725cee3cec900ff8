use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sage_core::config::Config;
use sage_core::engine::Engine;
use sage_core::error::EngineError;
use sage_core::extract;
use sage_llm::compatible::CompatibleProvider;
use sage_store::{Namespace, SqliteStore};

#[derive(Parser)]
#[command(name = "sage", version, about = "Multi-tenant retrieval-augmented agent backend")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "SAGE_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and ingest files into a namespace's knowledge base.
    Ingest {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: Option<String>,
        /// Files to ingest (txt, md, pdf with the pdf feature).
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete a namespace's documents and reset its index.
    Purge {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: Option<String>,
    },
    /// Ask a single grounded question.
    Query {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long)]
        session: String,
        prompt: String,
    },
    /// Interactive grounded conversation.
    Chat {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        agent: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value = "default")]
        session: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
    let provider = CompatibleProvider::new(
        api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.max_tokens,
        Some(config.llm.embedding_model.clone()),
    );

    if let Some(parent) = std::path::Path::new(&config.store.sqlite_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("failed to create data directory")?;
    }
    let store = SqliteStore::new(&config.store.sqlite_path).await?;
    let engine = Engine::new(provider, store, config.index_config(), config.index.top_k);

    let report = engine.rebuild().await?;
    tracing::info!(
        namespaces = report.namespaces,
        documents = report.vectors,
        "knowledge bases rebuilt from store"
    );

    match cli.command {
        Command::Ingest {
            owner,
            agent,
            scope,
            files,
        } => {
            let namespace = Namespace::resolve(&owner, &agent, scope.as_deref())?;
            for file in files {
                let text = extract::extract_file(&file)
                    .await
                    .with_context(|| format!("failed to extract {}", file.display()))?;
                let id = engine.ingest(&namespace, &text).await?;
                println!("ingested {} as document {id}", file.display());
            }
        }
        Command::Purge {
            owner,
            agent,
            scope,
        } => {
            let namespace = Namespace::resolve(&owner, &agent, scope.as_deref())?;
            let removed = engine.purge(&namespace).await?;
            println!("removed {removed} document(s) from {namespace}");
        }
        Command::Query {
            owner,
            agent,
            scope,
            session,
            prompt,
        } => {
            let namespace = Namespace::resolve(&owner, &agent, scope.as_deref())?;
            if !engine.session_exists(&namespace, &session) {
                engine.create_session(&namespace, &session, &config.agent.default_system_prompt);
            }
            let reply = engine.query(&namespace, &session, &prompt).await?;
            println!("{reply}");
        }
        Command::Chat {
            owner,
            agent,
            scope,
            session,
        } => {
            let namespace = Namespace::resolve(&owner, &agent, scope.as_deref())?;
            if !engine.session_exists(&namespace, &session) {
                engine.create_session(&namespace, &session, &config.agent.default_system_prompt);
            }
            run_chat(&engine, &namespace, &session).await?;
        }
    }

    Ok(())
}

async fn run_chat(
    engine: &Engine<CompatibleProvider>,
    namespace: &Namespace,
    session: &str,
) -> anyhow::Result<()> {
    println!(
        "sage v{} - chatting as {namespace} (empty line to exit)",
        env!("CARGO_PKG_VERSION")
    );
    loop {
        let prompt: String = dialoguer::Input::new()
            .with_prompt("you")
            .allow_empty(true)
            .interact_text()?;
        if prompt.trim().is_empty() {
            break;
        }
        match engine.query(namespace, session, &prompt).await {
            Ok(reply) => println!("{reply}"),
            Err(EngineError::NoKnowledgeBase) => {
                println!("no documents ingested for {namespace} yet - run `sage ingest` first");
            }
            Err(EngineError::NoRelevantContext) => {
                println!("knowledge base for {namespace} is empty - run `sage ingest` first");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

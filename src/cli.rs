//! CLI layer for RFP-Agent-RS.
//!
//! Parses command-line arguments with clap and wires the provider,
//! retriever gateway, conversation store, and chat service together for
//! a single question/answer invocation.

// This module is the crate's terminal output boundary.
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent::{
    AgentConfig, LlmGrader, LlmPlanner, LlmSynthesizer, LoopController, PromptSet, Question,
    create_provider,
};
use crate::retrieval::HttpRetrieverGateway;
use crate::service::{ChatError, ChatResponse, ChatService};
use crate::session::{SessionManager, SqliteConversationStore};

/// RFP-Agent: ask questions about ingested proposal documents.
///
/// Runs an iterative search/grade/synthesize loop against the Index
/// Store and prints the answer with its citations.
#[derive(Parser, Debug)]
#[command(name = "rfp-agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The question to answer.
    pub question: String,

    /// Session identifier; reuse one to continue a conversation.
    ///
    /// A fresh session id is generated when omitted.
    #[arg(short, long, env = "RFP_SESSION_ID")]
    pub session_id: Option<String>,

    /// Restrict the search to these document ids (repeatable).
    #[arg(short, long = "document")]
    pub documents: Vec<String>,

    /// Path to the conversation database file.
    #[arg(long, env = "RFP_DB_PATH", default_value = ".rfp-agent/sessions.db")]
    pub db_path: PathBuf,

    /// Base URL of the Index Store search endpoint.
    #[arg(long, env = "RFP_SEARCH_URL")]
    pub search_url: String,

    /// Override the maximum number of search attempts per question.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Override the number of passages requested per search.
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Executes one question/answer invocation.
///
/// # Errors
///
/// Returns an error if configuration, storage, or the answering cycle
/// fails. A persistence failure after a computed answer still prints
/// the answer and exits successfully.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = AgentConfig::builder().from_env();
    if let Some(n) = cli.max_iterations {
        builder = builder.max_iterations(n);
    }
    if let Some(k) = cli.top_k {
        builder = builder.top_k(k);
    }
    let config = builder.build().context("loading configuration")?;

    let provider = create_provider(&config)?;
    let prompts = PromptSet::load(config.prompt_dir.as_deref());
    let planner = LlmPlanner::new(Arc::clone(&provider), &config, prompts.planner.clone());
    let grader = LlmGrader::new(Arc::clone(&provider), &config, prompts.grader.clone());
    let synthesizer = LlmSynthesizer::new(Arc::clone(&provider), &config, prompts.synthesizer);
    let retriever = HttpRetrieverGateway::new(cli.search_url.clone());

    if let Some(parent) = cli.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteConversationStore::open(&cli.db_path)
        .with_context(|| format!("opening {}", cli.db_path.display()))?;
    let session = SessionManager::new(Arc::new(store), config.history_window);

    let controller = LoopController::new(
        Arc::new(planner),
        Arc::new(grader),
        Arc::new(synthesizer),
        Arc::new(retriever),
        config,
    );
    let service = ChatService::new(session, controller);

    let session_id = cli
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut question = Question::new(session_id, cli.question);
    question.document_ids = cli.documents;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    match service.answer(question, &cancel).await {
        Ok(response) => {
            print_response(&response);
            Ok(())
        }
        Err(ChatError::Save { response, source }) => {
            warn!(error = %source, "answer could not be saved to the conversation");
            print_response(&response);
            Ok(())
        }
        Err(ChatError::Agent(e)) => Err(e.into()),
    }
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.answer);
    if !response.citations.is_empty() {
        println!();
        println!("Sources:");
        for citation in &response.citations {
            println!("  - {} ({})", citation.document_id, citation.location);
        }
    }
    if response.gave_up {
        eprintln!("note: search was exhausted before the evidence was judged sufficient");
    }
    eprintln!("session: {}", response.session_id);
}

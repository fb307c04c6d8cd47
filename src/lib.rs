pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod frontend;
pub mod history;
pub mod llm;
pub mod models;
pub mod rag;
pub mod store;

use cli::{ Args, Command, StoreCommand };
use config::prompt::resolve_persona;
use frontend::{ ChatFrontend, SessionStart };
use llm::gemini::GeminiClient;
use log::info;
use models::chat::ChatResponse;
use models::store::{ ChunkingOptions, Operation };
use std::error::Error;
use std::sync::Arc;
use store::{ StoreAdmin, UploadOptions, DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL };
use tokio::io::{ AsyncBufReadExt, BufReader };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let gemini_config = args.gemini_config();
    let client = GeminiClient::from_config(&gemini_config)?;

    info!("--- Core Configuration ---");
    info!("Gemini Base URL: {}", client.base_url());
    info!("Model: {}", gemini_config.model_or_default());
    info!("Store: {}", args.store_name.as_deref().unwrap_or("(not set)"));
    info!("Metadata Filter: {}", args.metadata_filter.as_deref().unwrap_or("(none)"));
    info!("Persona: {}", args.persona_path.as_deref().unwrap_or("built-in"));
    info!("Deadline: {:?}", args.deadline());
    info!("-------------------------");

    let admin = StoreAdmin::new(client.clone());

    match args.command.clone() {
        Command::Store(cmd) => run_store_command(&admin, cmd).await?,
        Command::Upload {
            file,
            display_name,
            max_tokens_per_chunk,
            max_overlap_tokens,
            metadata,
            wait,
        } => {
            let store_name = args.require_store()?;
            let options = UploadOptions {
                display_name,
                chunking: ChunkingOptions::from_parts(max_tokens_per_chunk, max_overlap_tokens),
                custom_metadata: metadata,
            };
            let operation = admin.upload(&store_name, &file, options).await?;
            report_operation(&admin, operation, wait).await?;
        }
        Command::UploadDir { dir, extension, wait } => {
            let store_name = args.require_store()?;
            for (path, operation) in admin.upload_dir(&store_name, &dir, &extension).await? {
                println!("Uploaded file: {}", path.display());
                report_operation(&admin, operation, wait).await?;
            }
        }
        Command::Ask { query } => {
            let store_name = args.require_store()?;
            let response = admin.search(
                &store_name,
                &query,
                gemini_config.model.as_deref(),
                args.metadata_filter.clone()
            ).await?;
            print_response(&response);
        }
        Command::Chat => run_chat(&args, client).await?,
    }

    Ok(())
}

async fn run_store_command(
    admin: &StoreAdmin,
    cmd: StoreCommand
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cmd {
        StoreCommand::Create { display_name } => {
            let store = admin.create(&display_name).await?;
            println!("Created store: {}", store.name);
        }
        StoreCommand::List => {
            for store in admin.list().await? {
                println!("{}", store);
            }
        }
        StoreCommand::Get { name } => {
            let store = admin.get(&name).await?;
            println!("{}", serde_json::to_string_pretty(&store)?);
        }
        StoreCommand::Delete { name, no_force } => {
            admin.delete(&name, !no_force).await?;
            println!("Deleted store: {}", name);
        }
        StoreCommand::Cleanup { yes } => {
            if !yes {
                return Err("Refusing to delete every store without --yes".into());
            }
            for name in admin.cleanup().await? {
                println!("Deleted store: {}", name);
            }
        }
    }
    Ok(())
}

async fn report_operation(
    admin: &StoreAdmin,
    operation: Operation,
    wait: bool
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if !wait {
        println!("Operation: {} (done: {})", operation.name, operation.done);
        return Ok(());
    }
    let finished = admin.wait_for_operation(
        operation,
        DEFAULT_POLL_INTERVAL,
        DEFAULT_OPERATION_TIMEOUT
    ).await?;
    println!("Indexed: {}", finished.name);
    Ok(())
}

fn print_response(response: &ChatResponse) {
    println!("{}", response.text);
    for (i, citation) in response.citations.iter().enumerate() {
        println!("  [{}] {}", i + 1, citation);
    }
}

async fn run_chat(args: &Args, client: GeminiClient) -> Result<(), Box<dyn Error + Send + Sync>> {
    let persona = resolve_persona(args.persona_path.as_deref())?;
    let template = agent::SessionConfig {
        store_name: args.store_name.clone(),
        model: args.model.clone(),
        metadata_filter: args.metadata_filter.clone(),
        persona,
    };
    let frontend = ChatFrontend::new(Arc::new(client), template).with_deadline(args.deadline());

    let (mut session, startup_notice) = match frontend.start_session() {
        SessionStart::Ready { session, greeting } => {
            println!("{}", greeting);
            (Some(session), String::new())
        }
        SessionStart::Misconfigured { notice } => {
            println!("{}", notice);
            (None, notice)
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match console_line(&frontend, session.as_mut(), &startup_notice, &line).await {
            ConsoleStep::Print(output) => println!("{}", output),
            ConsoleStep::Skip => {}
            ConsoleStep::Quit => {
                break;
            }
        }
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum ConsoleStep {
    Print(String),
    Skip,
    Quit,
}

/// One console input line. `notice` is what the user sees when no session could be opened.
async fn console_line(
    frontend: &ChatFrontend,
    session: Option<&mut agent::ConversationSession>,
    notice: &str,
    line: &str
) -> ConsoleStep {
    let input = line.trim();
    match input {
        "" => ConsoleStep::Skip,
        "/quit" | "/exit" => ConsoleStep::Quit,
        "/reset" =>
            match session {
                Some(s) => {
                    s.reset();
                    ConsoleStep::Print("History cleared.".to_string())
                }
                None => ConsoleStep::Print(notice.to_string()),
            }
        "/history" =>
            match session {
                Some(s) => ConsoleStep::Print(s.history().transcript().trim_end().to_string()),
                None => ConsoleStep::Print(notice.to_string()),
            }
        _ => {
            let reply = frontend.handle_message(session, input).await;
            let mut output = reply.text;
            for panel in &reply.panels {
                output.push_str(&format!("\n  {}: {}", panel.name, panel.content));
            }
            ConsoleStep::Print(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::llm::grounding::Grounding;
    use crate::llm::{ GenerateRequest, Generation, KnowledgeService };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct Echo;

    #[async_trait]
    impl KnowledgeService for Echo {
        async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ServiceError> {
            let last = request.contents.last().map(|m| m.text().to_string()).unwrap_or_default();
            Ok(Generation { text: format!("echo: {}", last), grounding: Grounding::Absent })
        }
    }

    fn frontend(store: Option<&str>) -> ChatFrontend {
        ChatFrontend::new(Arc::new(Echo), agent::SessionConfig {
            store_name: store.map(String::from),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn commands_without_a_session_repeat_the_configuration_notice() {
        let frontend = frontend(None);
        let SessionStart::Misconfigured { notice } = frontend.start_session() else {
            panic!("session should not start without a store");
        };

        for command in ["/reset", "/history"] {
            let step = console_line(&frontend, None, &notice, command).await;
            assert_eq!(step, ConsoleStep::Print(notice.clone()));
        }
        assert_eq!(
            console_line(&frontend, None, &notice, "hello").await,
            ConsoleStep::Print(crate::frontend::NOT_INITIALIZED_NOTICE.to_string())
        );
    }

    #[tokio::test]
    async fn commands_drive_the_session() {
        let frontend = frontend(Some("stores/abc"));
        let SessionStart::Ready { mut session, .. } = frontend.start_session() else {
            panic!("session should start");
        };

        assert_eq!(
            console_line(&frontend, Some(&mut session), "", "  hi  ").await,
            ConsoleStep::Print("echo: hi".to_string())
        );
        assert_eq!(
            console_line(&frontend, Some(&mut session), "", "/history").await,
            ConsoleStep::Print("User: hi\nAssistant: echo: hi".to_string())
        );
        assert_eq!(
            console_line(&frontend, Some(&mut session), "", "/reset").await,
            ConsoleStep::Print("History cleared.".to_string())
        );
        assert!(session.history().is_empty());
        assert_eq!(console_line(&frontend, Some(&mut session), "", "   ").await, ConsoleStep::Skip);
        assert_eq!(console_line(&frontend, Some(&mut session), "", "/quit").await, ConsoleStep::Quit);
    }
}

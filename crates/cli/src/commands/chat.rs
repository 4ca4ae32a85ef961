//! `atlas chat`: interactive or single-message chat mode.

use std::io::Write;

use atlas_agent::{AGENT_NAME, AgentMode, AgentOrchestrator};
use atlas_config::AppConfig;
use atlas_core::memory::ConversationMemory;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::error;

const EXIT_COMMANDS: [&str; 4] = ["quit", "exit", "bye", "q"];
const GOODBYE: &str = "👋 Goodbye! Thanks for chatting!";

/// How the interactive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatExit {
    /// The user typed an exit command.
    Goodbye,
    /// Stdin closed.
    EndOfInput,
    /// A turn failed; the session was ended.
    Failed,
}

/// `quit`, `exit`, `bye` or `q`, in any case, surrounding whitespace ignored.
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    EXIT_COMMANDS.iter().any(|cmd| line.eq_ignore_ascii_case(cmd))
}

/// Setup instructions when the chat-model key is missing.
pub fn check_api_key(config: &AppConfig) -> Result<(), String> {
    if config.has_api_key() {
        return Ok(());
    }
    Err(format!(
        "
  ❌ Error: OPENROUTER_API_KEY not found

  Set it in your environment:
    export OPENROUTER_API_KEY='sk-or-v1-...'

  Or add `api_key` to {}
  Get an OpenRouter key at: https://openrouter.ai/keys
",
        atlas_config::CONFIG_FILE
    ))
}

pub async fn run(config: AppConfig, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if let Err(setup) = check_api_key(&config) {
        eprintln!("{setup}");
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = AgentOrchestrator::from_config(&config)?;
    let mut memory = ConversationMemory::new();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let response = agent.process(&mut memory, &msg).await;
        eprint!("\r              \r");
        println!("{}", response?);
        return Ok(());
    }

    print_banner(&agent, &config);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();

    tokio::select! {
        exit = chat_loop(&agent, &mut memory, stdin, &mut stdout) => {
            exit?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n\n{GOODBYE}\n");
        }
    }

    Ok(())
}

fn print_banner(agent: &AgentOrchestrator, config: &AppConfig) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!("🤖 {AGENT_NAME}");
    println!("{rule}");
    println!("Model: {}", agent.model());
    match agent.mode() {
        AgentMode::ToolCalling(tools) if config.has_conversion_key() => {
            println!("Tools: {}", tools.names().join(", "))
        }
        AgentMode::ToolCalling(tools) => {
            println!("Tools: {} (FREECRYPTO_API_KEY not set)", tools.names().join(", "))
        }
        AgentMode::SingleShot => println!("Tools: none (single-shot mode)"),
    }
    println!("Type 'quit', 'exit', or 'bye' to end the conversation");
    println!("{rule}\n");
}

/// Read lines from `input` until an exit command, end of input, or a failed
/// turn. Answers and errors are written to `out`.
pub async fn chat_loop<R, W>(
    agent: &AgentOrchestrator,
    memory: &mut ConversationMemory,
    input: R,
    out: &mut W,
) -> std::io::Result<ChatExit>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        write!(out, "You: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(out, "\n\n{GOODBYE}\n")?;
            return Ok(ChatExit::EndOfInput);
        };

        if is_exit_command(&line) {
            writeln!(out, "\n{GOODBYE}\n")?;
            return Ok(ChatExit::Goodbye);
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match agent.process(memory, line).await {
            Ok(response) => writeln!(out, "\nBot: {response}\n")?,
            Err(e) => {
                error!(error = %e, "Chat turn failed");
                writeln!(out, "\n❌ Error: {e}\n")?;
                writeln!(out, "Please check your API key and internet connection.\n")?;
                return Ok(ChatExit::Failed);
            }
        }
    }
}

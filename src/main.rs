//! `local-agent`: terminal front end for the tool-calling agent.
//!
//! Loads `.env`, resolves the endpoint, then runs one of three modes: a single
//! query (`-q`), a scripted demo (`--demo`), or an interactive REPL.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use local_agent::{
    Agent, AgentOptions, Message, Observers, Provider, SYSTEM_PROMPT, ToolResult, TurnEvent,
    builtin_tools, get_api_key, get_base_url, get_model,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use std::sync::{Arc, Mutex};

const DEFAULT_MODEL: &str = "glm-5";

const DEMO_QUERIES: [&str; 3] = [
    "What files are in the current directory? Summarize the project structure.",
    "Read the Cargo.toml file and tell me which dependencies are configured.",
    "What's the current date and time? Calculate how many days until the end of the year.",
];

/// Interactive AI assistant with real local tools.
#[derive(Parser)]
#[command(name = "local-agent", version, about)]
struct Cli {
    /// Run a single query and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Run the demo queries
    #[arg(long)]
    demo: bool,

    /// Hide thinking/reasoning output
    #[arg(long)]
    no_thinking: bool,

    /// Model name (default: $LOCAL_AGENT_MODEL, then glm-5)
    #[arg(short, long)]
    model: Option<String>,

    /// Server base URL, e.g. http://localhost:11434/v1
    #[arg(long)]
    base_url: Option<String>,

    /// Provider shortcut used when no base URL is given (lmstudio, ollama, llamacpp, vllm, zhipu, openai)
    #[arg(long)]
    provider: Option<Provider>,

    /// Maximum model rounds per user turn
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let renderer = Arc::new(Renderer::new(!cli.no_thinking));
    let agent = build_agent(&cli, renderer.clone()).context("Failed to initialize client")?;

    if cli.demo {
        demo(&agent, &renderer).await;
    } else if let Some(query) = &cli.query {
        println!("{} {}\n", "Query:".green().bold(), query);
        let mut transcript = agent.new_transcript();
        run_turn(&agent, &renderer, &mut transcript, query).await;
    } else {
        repl(&agent, &renderer).await?;
    }

    Ok(())
}

fn build_agent(cli: &Cli, renderer: Arc<Renderer>) -> Result<Agent> {
    let base_url = match &cli.base_url {
        Some(url) => url.clone(),
        None => get_base_url(cli.provider, None),
    };
    let model = match &cli.model {
        Some(model) => model.clone(),
        None => get_model(Some(DEFAULT_MODEL), true).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
    };

    let mut builder = AgentOptions::builder()
        .system_prompt(SYSTEM_PROMPT)
        .model(model)
        .base_url(base_url)
        .tools(builtin_tools())
        .max_iterations(cli.max_iterations);
    if let Some(key) = get_api_key() {
        builder = builder.api_key(key);
    }

    let observers = Observers::new().on_event(move |event| renderer.handle(event));
    Ok(Agent::new(builder.build()?)?.with_observers(observers))
}

/// Runs one user turn, turning Ctrl-C into an interrupt of that turn.
async fn run_turn(agent: &Agent, renderer: &Renderer, transcript: &mut Vec<Message>, input: &str) {
    let interrupt = agent.interrupt_handle();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.interrupt();
        }
    });

    let result = agent.run(transcript, input).await;
    watcher.abort();
    renderer.end_turn();

    match result {
        Ok(_) => {}
        Err(local_agent::Error::Interrupted) => println!("\n{}", "Interrupted.".yellow()),
        Err(e) => eprintln!("{} {}", "Agent error:".red().bold(), e),
    }
}

async fn repl(agent: &Agent, renderer: &Renderer) -> Result<()> {
    let options = agent.options();
    println!("{}", "Local Agent".bold().cyan());
    println!("Model: {} | Tools: {}", options.model, options.tools.len());
    println!(
        "{}",
        "Type quit to exit, clear to reset history".dimmed()
    );

    let mut editor = DefaultEditor::new()?;
    let mut transcript = agent.new_transcript();

    loop {
        let line = match editor.readline(&format!("\n{} ", "You>".green().bold())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("{}", "Goodbye.".dimmed());
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match input.to_lowercase().as_str() {
            "quit" | "exit" => {
                println!("{}", "Goodbye.".dimmed());
                break;
            }
            "clear" => {
                transcript = agent.new_transcript();
                println!("{}", "History cleared.".dimmed());
                continue;
            }
            _ => {}
        }

        println!();
        run_turn(agent, renderer, &mut transcript, input).await;
    }

    Ok(())
}

async fn demo(agent: &Agent, renderer: &Renderer) {
    println!("{}", "Local Agent - Demo Mode".bold().cyan());
    println!(
        "Model: {} | Running {} showcase queries",
        agent.options().model,
        DEMO_QUERIES.len()
    );

    let rule = "=".repeat(60);
    for (i, query) in DEMO_QUERIES.iter().enumerate() {
        println!("\n{rule}");
        println!("{} {}\n", format!("Demo {}/{}:", i + 1, DEMO_QUERIES.len()).bold(), query);

        let mut transcript = agent.new_transcript();
        run_turn(agent, renderer, &mut transcript, query).await;
    }

    println!("\n{rule}");
    println!("{}", "Demo complete.".green().bold());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Reasoning,
    Answer,
}

/// Prints turn events as they arrive.
struct Renderer {
    show_thinking: bool,
    phase: Mutex<Phase>,
}

impl Renderer {
    fn new(show_thinking: bool) -> Self {
        Self {
            show_thinking,
            phase: Mutex::new(Phase::Idle),
        }
    }

    fn set_phase(&self, next: Phase) -> Phase {
        let mut phase = self.phase.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *phase, next)
    }

    fn handle(&self, event: &TurnEvent) {
        match event {
            TurnEvent::ReasoningDelta(text) => {
                if !self.show_thinking {
                    return;
                }
                if self.set_phase(Phase::Reasoning) != Phase::Reasoning {
                    print!("{}", "Thinking... ".dimmed().italic());
                }
                print!("{}", text.dimmed());
            }
            TurnEvent::AnswerDelta(text) => {
                if self.set_phase(Phase::Answer) == Phase::Reasoning {
                    println!("\n");
                }
                print!("{text}");
            }
            TurnEvent::ToolCallStarted { name, arguments, .. } => {
                self.set_phase(Phase::Idle);
                println!("\n{} {}", format!("> {name}").cyan(), arguments.to_string().dimmed());
            }
            TurnEvent::ToolCallFinished { result, .. } => match result {
                ToolResult::Success(value) => match value.get("error").and_then(|e| e.as_str()) {
                    Some(error) => println!("  {}", error.red()),
                    None => println!("  {}", preview(&value.to_string()).dimmed()),
                },
                ToolResult::Error(error) => println!("  {}", error.red()),
            },
            TurnEvent::ToolArgumentsInvalid { name, error, .. } => {
                self.set_phase(Phase::Idle);
                println!("\n{} {}", format!("> {name}").cyan(), error.red());
            }
            TurnEvent::MaxIterationsReached { .. } => {
                println!("\n{}", "Reached max iterations for this turn.".yellow());
            }
        }
        let _ = std::io::stdout().flush();
    }

    fn end_turn(&self) {
        if self.set_phase(Phase::Idle) != Phase::Idle {
            println!();
        }
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

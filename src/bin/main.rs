use wedding_planner_orchestrator::{
    agent::Orchestrator,
    config::OrchestratorConfig,
    scheduler::{FollowUpScheduler, TokioFollowUpScheduler},
    synthesizer::QuickAction,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const QUIT_COMMANDS: &[&str] = &["quit", "exit", "q", "종료"];

fn print_actions(actions: &[QuickAction]) {
    if actions.is_empty() {
        return;
    }
    let labels: Vec<String> = actions.iter().map(|a| format!("[{}]", a.label())).collect();
    println!("  {}", labels.join(" "));
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = OrchestratorConfig::from_env()?;
    let user_id = config.trial_user_id;
    if config.gemini_api_key.is_none() {
        eprintln!("GEMINI_API_KEY not set; using keyword parsing and template replies");
    }

    let orchestrator = Orchestrator::from_config(config)?;
    info!(user_id = %user_id, "Planner console ready");

    let (scheduler, mut follow_ups) = TokioFollowUpScheduler::new();
    tokio::spawn(async move {
        while let Some(follow_up) = follow_ups.recv().await {
            println!("\nPlanner: {}", follow_up.message);
            print_actions(&follow_up.quick_actions);
            prompt();
        }
    });

    println!("Wedding planner. Type 'quit' to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&line.to_lowercase().as_str()) {
            break;
        }

        match orchestrator.handle_turn(user_id, line, &CancellationToken::new()).await {
            Ok(outcome) => {
                println!("Planner: {}", outcome.reply);
                print_actions(&outcome.quick_actions);
                for follow_up in outcome.follow_ups {
                    if let Err(e) = scheduler.schedule(follow_up) {
                        warn!(error = %e, "Could not schedule follow-up");
                    }
                }
            }
            Err(e) => eprintln!("Something went wrong: {}", e),
        }
    }

    println!("Bye!");
    Ok(())
}

use std::io::Write as _;
use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};

use seetap::agent_engine::engine::AutomationLoop;
use seetap::agent_engine::state::InstructionState;
use seetap::config;
use seetap::errors::SeeTapResult;

const PROMPT: &str = "Enter steps separated by ';' (or 'exit' to quit): ";

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    seetap::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "seetap stopped");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SeeTapResult<()> {
    let cfg = config::load_config()?;
    cfg.validate()?;

    let (_appium, session) = seetap::connect(&cfg).await?;
    let cfg = &cfg;
    seetap::with_session(session, |session| async move {
        let automation = seetap::build_loop(cfg, session)?;
        seetap::until_interrupted(prompt_loop(&automation), tokio::signal::ctrl_c()).await
    })
    .await
}

async fn prompt_loop(automation: &AutomationLoop) -> SeeTapResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{PROMPT}");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        let batch = split_batch(line);
        if batch.is_empty() {
            continue;
        }
        run_with_progress(automation, &batch).await?;
    }
    Ok(())
}

/// Run one batch, printing loop events as they arrive.
async fn run_with_progress(automation: &AutomationLoop, batch: &[String]) -> SeeTapResult<()> {
    let mut events = automation.events().subscribe();
    let run = automation.run_batch(batch);
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            res = &mut run => break res,
            Ok(event) = events.recv() => println!("{event}"),
        }
    };
    while let Ok(event) = events.try_recv() {
        println!("{event}");
    }

    let reports = result?;
    let done = reports
        .iter()
        .filter(|r| r.final_state == InstructionState::Done)
        .count();
    println!("{done}/{} step(s) done", reports.len());
    Ok(())
}

fn split_batch(line: &str) -> Vec<String> {
    line.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

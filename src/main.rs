use anyhow::Result;
use comfy_move_lib::commands::{self, Command, HELP};
use comfy_move_lib::config::default_config_dir;
use comfy_move_lib::{logging, AppState};
use log::{error, info, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(LevelFilter::Info);

    let config_dir = default_config_dir()?;
    info!("Starting AppState initialization from {:?}", config_dir);
    let app_state = AppState::new(&config_dir).await?;
    let manager = app_state.bluetooth_manager();

    // Print every state change, the way the UI would render it.
    let mut states = manager.subscribe_connection_state();
    let watcher = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            println!("> {}", state);
            if state.is_terminal() {
                println!("  type 'reset' to start over");
            }
        }
    });

    println!("{}", HELP);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        let quit = command == Command::Quit;
        match commands::execute(&manager, command).await {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                error!("{}", e);
                println!("{}", e);
            }
        }
        if quit {
            break;
        }
    }

    manager.shutdown().await;
    watcher.abort();
    info!("Courtesy-seat notifier stopped");
    Ok(())
}

use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use room_tictactoe::models::SIMULATED_OPPONENT;
use room_tictactoe::{ClientError, Config, GameState, Session, SessionState};

enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("Candidate servers: {}", config.connection.candidates.join(", "));

    let mut session = Session::from_config(&config);
    match session.restore().await {
        Ok(Some(mode)) => info!("Restored previous session ({:?})", mode),
        Ok(None) => println!("Type `login <name>` to start, `help` for commands."),
        Err(e) => error!("Stored display name unusable: {}", e),
    }
    show(&mut session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match handle_command(&mut session, line.trim()).await {
                        Ok(Flow::Continue) => show(&mut session),
                        Ok(Flow::Quit) => break,
                        Err(e) => println!("! {e}"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = session.next() => show(&mut session),
        }
    }

    session.connection().disconnect().await;
}

async fn handle_command(session: &mut Session, line: &str) -> Result<Flow, ClientError> {
    let (command, rest) = line
        .split_once(' ')
        .map_or((line, ""), |(command, rest)| (command, rest.trim()));

    match command {
        "" | "rooms" => {}
        "login" => {
            session.login(rest).await?;
        }
        "create" => {
            let (name, is_private) = match rest.strip_suffix("private") {
                Some(name) => (name.trim(), true),
                None => (rest, false),
            };
            let name = if name.is_empty() { "New room" } else { name };
            session.create_room(name, is_private)?;
        }
        "join" => session.join_room(rest)?,
        "random" => session.join_random()?,
        "leave" => session.leave_room()?,
        "move" => match rest.parse::<usize>() {
            Ok(index) => session.make_move(index)?,
            Err(_) => println!("usage: move <0-8>"),
        },
        "say" => session.send_message(rest)?,
        "restart" => session.restart_game()?,
        "logout" => session.logout().await,
        "quit" | "exit" => return Ok(Flow::Quit),
        "help" => print_help(),
        other => println!("unknown command `{other}`; try `help`"),
    }
    Ok(Flow::Continue)
}

fn print_help() {
    println!("login <name>          connect (or play offline) as <name>");
    println!("rooms                 show the room list");
    println!("create <name> [private]");
    println!("join <room id>        join by code");
    println!("random                join any open room");
    println!("move <0-8>            play a cell, row by row");
    println!("say <text>            chat");
    println!("restart | leave | logout | quit");
}

fn show(session: &mut Session) {
    print_state(session.state());
    session.clear_notice();
}

fn print_state(state: &SessionState) {
    println!(
        "[{:?}] {} ({:?})",
        state.phase(),
        state.name.as_deref().unwrap_or("-"),
        state.mode
    );
    if let Some(notice) = &state.notice {
        println!("  ! {notice}");
    }

    if !state.in_room() {
        for room in &state.rooms {
            println!(
                "  {:<12} {:<20} {}/2{}",
                room.id,
                room.name,
                room.players.len(),
                if room.is_private { " private" } else { "" }
            );
        }
        return;
    }

    if let Some(game) = &state.game {
        print_board(game);
    }
    for message in state.chat.iter().rev().take(5).rev() {
        println!("  <{}> {}", message.sender, message.text);
    }
}

fn print_board(game: &GameState) {
    for row in game.board.chunks(3) {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.map_or_else(|| ".".to_string(), |mark| mark.to_string()))
            .collect();
        println!("  {}", cells.join(" "));
    }

    if game.game_over {
        match &game.winner {
            Some(winner) => println!("  {winner} wins"),
            None => println!("  Draw"),
        }
    } else {
        let player = game
            .players
            .get(game.current_turn)
            .unwrap_or(SIMULATED_OPPONENT);
        println!("  {} to move ({})", player, game.current_turn);
    }
}

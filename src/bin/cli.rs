// QuizWave CLI
// Drives a running session server from the terminal: health checks, hosting,
// playing and automated validation scenarios.

use clap::{Parser, Subcommand};
use colored::*;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

#[derive(Parser)]
#[command(name = "quizwave-cli")]
#[command(about = "QuizWave session server CLI", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Create a session over HTTP and print its game PIN
    Create {
        #[arg(short, long)]
        quiz_id: String,

        #[arg(short, long, default_value = "cli-teacher")]
        teacher_id: String,
    },

    /// Create a session and host it interactively
    Host {
        #[arg(short, long)]
        quiz_id: String,

        #[arg(short, long, default_value = "cli-teacher")]
        teacher_id: String,
    },

    /// Join a session as a participant and answer from the terminal
    Play {
        #[arg(short, long)]
        pin: String,

        #[arg(short, long)]
        nickname: String,
    },

    /// Run automated validation scenarios
    Validate {
        /// Quiz used by scenarios that create sessions
        #[arg(short, long, default_value = "sample")]
        quiz_id: String,

        #[arg(short, long)]
        all: bool,

        #[arg(short = 'n', long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Create {
            quiz_id,
            teacher_id,
        } => {
            create_session(&cli.server, quiz_id, teacher_id).await;
        }
        Commands::Host {
            quiz_id,
            teacher_id,
        } => {
            host_session(&cli.server, quiz_id, teacher_id).await;
        }
        Commands::Play { pin, nickname } => {
            play_session(&cli.server, pin, nickname).await;
        }
        Commands::Validate {
            quiz_id,
            all,
            scenario,
        } => {
            if *all {
                run_all_validations(&cli.server, quiz_id).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, quiz_id, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/quiz/health", server);
    match reqwest::Client::new().get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            println!("{} Health check passed", "✓".green());
            if let Ok(body) = resp.json::<Value>().await {
                println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                println!("  Active sessions: {}", body["activeSessions"]);
            }
        }
        Ok(resp) => {
            println!("{} Health check failed: {}", "✗".red(), resp.status());
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn create_session(server: &str, quiz_id: &str, teacher_id: &str) {
    println!("{}", "Creating session...".cyan());

    let url = format!("http://{}/quiz/sessions", server);
    let request = json!({ "quizId": quiz_id, "teacherId": teacher_id });
    match reqwest::Client::new().post(&url).json(&request).send().await {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            if status.is_success() {
                print_pin_banner(body["gamePin"].as_str().unwrap_or("??????"));
                println!("  Session ID: {}", body["sessionId"].as_str().unwrap_or("unknown"));
            } else {
                println!("{} {} ({})", "✗".red(), body["error"], status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}

fn print_pin_banner(pin: &str) {
    println!("\n{}", "═".repeat(50).green());
    println!("{} {}", "Game PIN:".bold(), pin.green().bold());
    println!("{}", "═".repeat(50).green());
}

async fn connect(server: &str) -> Option<(WsWrite, WsRead)> {
    let url = format!("ws://{}/quiz", server);
    match connect_async(&url).await {
        Ok((ws_stream, _)) => Some(ws_stream.split()),
        Err(e) => {
            println!("{} Cannot connect to {}: {}", "✗".red(), url, e);
            None
        }
    }
}

async fn send_json(write: &mut WsWrite, message: Value) -> bool {
    write.send(Message::Text(message.to_string())).await.is_ok()
}

/// Next JSON text frame, skipping control frames
async fn next_json(read: &mut WsRead, secs: u64) -> Option<Value> {
    loop {
        match timeout(Duration::from_secs(secs), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return serde_json::from_str(&text).ok(),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(_))) | Err(_) => return None,
        }
    }
}

/// Reads frames until one of `kind` arrives
async fn wait_for(read: &mut WsRead, kind: &str, secs: u64) -> Option<Value> {
    loop {
        let message = next_json(read, secs).await?;
        if message["type"] == kind {
            return Some(message);
        }
        if message["type"] == "error" {
            println!("{} Error: {}", "✗".red(), message["message"]);
            return None;
        }
    }
}

fn print_event(message: &Value) {
    let kind = message["type"].as_str().unwrap_or("?");
    match kind {
        "started" | "question-advanced" => {
            let q = &message["questionData"];
            println!(
                "\n{} Question {}/{}: {}",
                "▶".cyan(),
                q["index"].as_u64().unwrap_or(0) + 1,
                q["count"],
                q["text"].as_str().unwrap_or("").bold()
            );
            if let Some(options) = q["options"].as_array() {
                for (i, option) in options.iter().enumerate() {
                    println!("   [{}] {}", i, option.as_str().unwrap_or(""));
                }
            }
            println!("   {} seconds, {} points", q["timeLimitSeconds"], q["points"]);
        }
        "answer-received" => {
            let verdict = if message["isCorrect"] == true {
                "correct".green()
            } else {
                "wrong".red()
            };
            println!("{} Answer {} (+{}, total {})", "◀".green(), verdict, message["points"], message["totalScore"]);
        }
        "leaderboard" | "ended" => {
            if kind == "ended" {
                println!("\n{} Session ended ({})", "■".yellow(), message["reason"]);
            }
            if let Some(entries) = message["leaderboard"]["entries"].as_array() {
                for entry in entries.iter().take(10) {
                    println!(
                        "   #{} {} {}",
                        entry["rank"],
                        entry["nickname"].as_str().unwrap_or("").bold(),
                        entry["totalScore"]
                    );
                }
            }
        }
        "error" => {
            println!("{} {}", "✗".red(), message["message"]);
        }
        _ => {
            println!("{} {}", "◀".green(), message.to_string().bright_white());
        }
    }
}

async fn host_session(server: &str, quiz_id: &str, teacher_id: &str) {
    let Some((mut write, mut read)) = connect(server).await else {
        return;
    };

    let request = json!({ "type": "create-session", "quizId": quiz_id, "teacherId": teacher_id });
    if !send_json(&mut write, request).await {
        println!("{} Failed to send create-session", "✗".red());
        return;
    }
    let Some(created) = wait_for(&mut read, "session-created", 5).await else {
        println!("{} No session-created response", "✗".red());
        return;
    };
    let session_id = created["sessionId"].as_str().unwrap_or_default().to_string();
    print_pin_banner(created["gamePin"].as_str().unwrap_or("??????"));
    println!(
        "Commands: {} {} {} {} {}",
        "start".cyan(),
        "close".cyan(),
        "next".cyan(),
        "sync".cyan(),
        "end".cyan()
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            message = next_json(&mut read, 3600) => {
                let Some(message) = message else {
                    println!("{} Connection closed", "✗".yellow());
                    break;
                };
                print_event(&message);
                if message["type"] == "ended" {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                let kind = match line.trim() {
                    "start" => "start",
                    "close" => "close-question",
                    "next" => "next-question",
                    "sync" => "sync",
                    "end" => "end",
                    "" => continue,
                    other => {
                        println!("{} Unknown command: {}", "✗".yellow(), other);
                        continue;
                    }
                };
                send_json(&mut write, json!({ "type": kind, "sessionId": session_id })).await;
            }
        }
    }
}

async fn play_session(server: &str, pin: &str, nickname: &str) {
    let Some((mut write, mut read)) = connect(server).await else {
        return;
    };

    send_json(&mut write, json!({ "type": "join", "gamePin": pin, "nickname": nickname })).await;
    let Some(joined) = wait_for(&mut read, "joined", 5).await else {
        println!("{} Could not join session {}", "✗".red(), pin);
        return;
    };
    let session_id = joined["sessionId"].as_str().unwrap_or_default().to_string();
    println!("{} Joined as {}", "✓".green(), nickname.bold());
    println!("Type option numbers separated by commas to answer, e.g. {}", "0,2".cyan());

    let mut current_question: Option<u64> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            message = next_json(&mut read, 3600) => {
                let Some(message) = message else {
                    println!("{} Connection closed", "✗".yellow());
                    break;
                };
                if message["type"] == "started" || message["type"] == "question-advanced" {
                    current_question = message["questionIndex"].as_u64();
                }
                print_event(&message);
                if message["type"] == "ended" {
                    break;
                }
            }
            line = stdin.next_line() => {
                let Ok(Some(line)) = line else { break };
                let Some(question_index) = current_question else {
                    println!("{}", "No question is open yet".yellow());
                    continue;
                };
                let selected: Vec<u64> = line
                    .split(',')
                    .filter_map(|s| s.trim().parse().ok())
                    .collect();
                send_json(&mut write, json!({
                    "type": "answer",
                    "sessionId": session_id,
                    "questionIndex": question_index,
                    "selectedOptions": selected,
                }))
                .await;
            }
        }
    }
}

const SCENARIOS: [&str; 5] = ["connection", "create-session", "join", "invalid-pin", "full-round"];

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    println!("  {} - Basic WebSocket connection test", "connection".cyan());
    println!("  {} - Session creation over WebSocket", "create-session".cyan());
    println!("  {} - Participant join and teacher notification", "join".cyan());
    println!("  {} - Join with an unknown PIN (error handling)", "invalid-pin".cyan());
    println!("  {} - Start, answer, close, end", "full-round".cyan());
    println!("\nExample: quizwave-cli validate --scenario join --quiz-id sample");
}

async fn run_scenario(server: &str, quiz_id: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    let Some(result) = scenario_result(server, quiz_id, scenario).await else {
        println!("{} Unknown scenario: {}", "✗".red(), scenario);
        list_scenarios();
        return;
    };

    if result {
        println!("\n{} Scenario passed", "✓".green().bold());
    } else {
        println!("\n{} Scenario failed", "✗".red().bold());
    }
}

async fn scenario_result(server: &str, quiz_id: &str, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "connection" => validate_connection(server).await,
        "create-session" => validate_create_session(server, quiz_id).await,
        "join" => validate_join(server, quiz_id).await,
        "invalid-pin" => validate_invalid_pin(server).await,
        "full-round" => validate_full_round(server, quiz_id).await,
        _ => return None,
    };
    Some(result)
}

async fn run_all_validations(server: &str, quiz_id: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;
    for scenario in SCENARIOS {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if scenario_result(server, quiz_id, scenario).await == Some(true) {
            passed += 1;
        } else {
            failed += 1;
        }
        sleep(Duration::from_millis(200)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} {}", "Passed:".green(), passed);
    println!("  {} {}", "Failed:".red(), failed);
}

async fn validate_connection(server: &str) -> bool {
    match connect(server).await {
        Some(_) => {
            println!("{} WebSocket connection established", "✓".green());
            true
        }
        None => false,
    }
}

/// Creates a session over WebSocket; returns (sessionId, gamePin) and the host stream
async fn open_hosted_session(server: &str, quiz_id: &str) -> Option<(String, String, WsWrite, WsRead)> {
    let (mut write, mut read) = connect(server).await?;
    let request = json!({ "type": "create-session", "quizId": quiz_id, "teacherId": "cli-validator" });
    if !send_json(&mut write, request).await {
        return None;
    }
    let created = wait_for(&mut read, "session-created", 5).await?;
    wait_for(&mut read, "teacher-joined", 5).await?;
    Some((
        created["sessionId"].as_str()?.to_string(),
        created["gamePin"].as_str()?.to_string(),
        write,
        read,
    ))
}

async fn validate_create_session(server: &str, quiz_id: &str) -> bool {
    match open_hosted_session(server, quiz_id).await {
        Some((session_id, pin, _, _)) => {
            println!("{} Session {} created with PIN {}", "✓".green(), session_id, pin.bold());
            pin.len() == 6 && pin.chars().all(|c| c.is_ascii_digit())
        }
        None => {
            println!("{} Session creation failed", "✗".red());
            false
        }
    }
}

async fn validate_join(server: &str, quiz_id: &str) -> bool {
    let Some((_, pin, _host_write, mut host_read)) = open_hosted_session(server, quiz_id).await else {
        return false;
    };
    let Some((mut write, mut read)) = connect(server).await else {
        return false;
    };

    send_json(&mut write, json!({ "type": "join", "gamePin": pin, "nickname": "Validator" })).await;
    let joined = wait_for(&mut read, "joined", 5).await.is_some();
    let notified = wait_for(&mut host_read, "participant-joined", 5).await.is_some();

    println!("{} Participant joined: {}", if joined { "✓".green() } else { "✗".red() }, joined);
    println!("{} Teacher notified: {}", if notified { "✓".green() } else { "✗".red() }, notified);
    joined && notified
}

async fn validate_invalid_pin(server: &str) -> bool {
    let Some((mut write, mut read)) = connect(server).await else {
        return false;
    };
    send_json(&mut write, json!({ "type": "join", "gamePin": "not-a-pin", "nickname": "Nobody" })).await;

    match next_json(&mut read, 5).await {
        Some(message) if message["type"] == "error" && message["code"] == "not_found" => {
            println!("{} Server rejected unknown PIN", "✓".green());
            true
        }
        other => {
            println!("{} Unexpected response: {:?}", "✗".red(), other);
            false
        }
    }
}

async fn validate_full_round(server: &str, quiz_id: &str) -> bool {
    let Some((session_id, pin, mut host_write, mut host_read)) =
        open_hosted_session(server, quiz_id).await
    else {
        return false;
    };
    let Some((mut write, mut read)) = connect(server).await else {
        return false;
    };

    send_json(&mut write, json!({ "type": "join", "gamePin": pin, "nickname": "Runner" })).await;
    if wait_for(&mut read, "joined", 5).await.is_none() {
        return false;
    }

    send_json(&mut host_write, json!({ "type": "start", "sessionId": session_id })).await;
    let Some(started) = wait_for(&mut read, "started", 5).await else {
        return false;
    };
    println!("{} Quiz started", "✓".green());

    send_json(&mut write, json!({
        "type": "answer",
        "sessionId": session_id,
        "questionIndex": started["questionIndex"],
        "selectedOptions": [0],
    }))
    .await;
    if wait_for(&mut read, "answer-received", 5).await.is_none() {
        return false;
    }
    println!("{} Answer acknowledged", "✓".green());

    if wait_for(&mut host_read, "question-results", 5).await.is_none() {
        return false;
    }
    println!("{} Results revealed after everyone answered", "✓".green());

    send_json(&mut host_write, json!({ "type": "end", "sessionId": session_id })).await;
    let ended = wait_for(&mut read, "ended", 5).await;
    let authoritative = ended
        .as_ref()
        .map(|m| m["leaderboard"]["authoritative"] == true)
        .unwrap_or(false);
    println!("{} Final leaderboard received", if authoritative { "✓".green() } else { "✗".red() });
    authoritative
}

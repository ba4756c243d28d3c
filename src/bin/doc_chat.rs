use clap::Parser;
use doc_chat_relay::cli::ClientArgs;
use doc_chat_relay::consumer::{ ChatSession, Transcript };
use doc_chat_relay::models::chat::Role;
use dotenv::dotenv;
use log::info;
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::sync::watch;

/// Prints the growing assistant reply as new snapshots arrive.
#[derive(Default)]
struct ReplyPrinter {
    index: Option<usize>,
    printed: String,
}

impl ReplyPrinter {
    fn show(&mut self, transcript: &Transcript) {
        let Some(last) = transcript.last() else {
            return;
        };
        if last.role != Role::Assistant {
            return;
        }
        let index = transcript.messages.len() - 1;
        if self.index != Some(index) {
            self.index = Some(index);
            self.printed.clear();
            print!("assistant> ");
        }

        let mut out = std::io::stdout();
        match last.content.strip_prefix(self.printed.as_str()) {
            Some(rest) => {
                let _ = write!(out, "{}", rest);
            }
            None => {
                // Reply was replaced (transport failure): reprint it whole.
                let _ = write!(out, "\n{}", last.content);
            }
        }
        let _ = out.flush();
        self.printed = last.content.clone();
    }
}

async fn run_turn(
    session: &mut ChatSession,
    updates: &mut watch::Receiver<Transcript>,
    printer: &mut ReplyPrinter,
    input: &str,
    document: Option<&str>
) {
    let turn = session.submit_turn(input, document);
    tokio::pin!(turn);

    loop {
        tokio::select! {
            _ = &mut turn => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                printer.show(&snapshot);
            }
        }
    }

    let snapshot = updates.borrow_and_update().clone();
    printer.show(&snapshot);
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = ClientArgs::parse();

    let document = match &args.document {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("Failed to read document '{}': {}", path, e))?;
            info!("Attached {} characters of document text from {}", text.chars().count(), path);
            Some(text)
        }
        None => None,
    };

    let mut session = ChatSession::new(args.endpoint.clone());
    let mut updates = session.subscribe();
    let mut printer = ReplyPrinter::default();

    println!("Connected to {} (/reset to start over, /quit to exit)", args.endpoint);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/reset" => {
                session.reset();
                printer = ReplyPrinter::default();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        run_turn(&mut session, &mut updates, &mut printer, &line, document.as_deref()).await;
    }

    Ok(())
}

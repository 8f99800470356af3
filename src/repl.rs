//! Interactive command-line chat (`kw --mode cli`).
//!
//! Reads one question per line and prints the answer with its sources. Lines
//! starting with a command word are handled locally:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `help` | list commands |
//! | `status` | print store statistics |
//! | `clear` | forget the conversation history |
//! | `quit`, `exit`, `q` | leave |
//!
//! A failed answer is printed and the loop continues.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::error;

use crate::models::Answer;
use crate::rag::{Conversation, RagPipeline};
use crate::stats::render_stats;

const HELP: &str = "Commands:
  help              show this message
  status            show vector store statistics
  clear             clear the conversation history
  quit | exit | q   leave
Anything else is sent as a question.";

enum Command {
    Help,
    Status,
    Clear,
    Quit,
    Ask,
}

fn parse_command(line: &str) -> Command {
    match line.to_ascii_lowercase().as_str() {
        "help" | "?" => Command::Help,
        "status" => Command::Status,
        "clear" => Command::Clear,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Ask,
    }
}

/// Run the chat loop until a quit command or end of input.
pub async fn run_repl<R: BufRead, W: Write>(
    pipeline: &RagPipeline,
    history_turns: usize,
    mut input: R,
    out: &mut W,
) -> Result<()> {
    let mut conversation = Conversation::new(history_turns);
    writeln!(out, "Knowledge Worker. Ask a question, or type `help`.")?;

    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Status => match pipeline.store().stats().await {
                Ok(stats) => write!(out, "{}", render_stats(&stats))?,
                Err(e) => writeln!(out, "error: {:#}", e)?,
            },
            Command::Clear => {
                conversation.clear();
                writeln!(out, "history cleared")?;
            }
            Command::Quit => break,
            Command::Ask => match pipeline.ask(&mut conversation, line).await {
                Ok(answer) => write_answer(out, &answer)?,
                Err(e) => {
                    error!(error = %format!("{:#}", e), "failed to answer question");
                    writeln!(out, "error: {:#}", e)?;
                }
            },
        }
    }

    Ok(())
}

fn write_answer<W: Write>(out: &mut W, answer: &Answer) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", answer.answer.trim())?;
    if !answer.sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for (i, source) in answer.sources.iter().enumerate() {
            writeln!(
                out,
                "  [{}] {}#{} (score {:.3})",
                i + 1,
                source.path,
                source.chunk_index,
                source.score
            )?;
        }
    }
    writeln!(out)?;
    Ok(())
}

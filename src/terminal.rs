//! Terminal front-end for the chat widget.
//!
//! Each input line is submitted as a question. `/clear` resets the
//! conversation and `/quit` (or end of input) leaves. Only messages added
//! since the previous line are printed, so the log reads top to bottom.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::render::{EMPTY_STATE_TEXT, render_text};
use crate::widget::ChatWidget;

const CLEAR_COMMAND: &str = "/clear";
const QUIT_COMMAND: &str = "/quit";

/// Run an interactive session until `/quit` or end of input.
pub async fn run_chat<R, W>(widget: &ChatWidget, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut printed = widget.snapshot().message_count();

    let banner =
        format!("{EMPTY_STATE_TEXT}\n(type {CLEAR_COMMAND} to reset, {QUIT_COMMAND} to exit)\n");
    output.write_all(banner.as_bytes()).await?;
    output.flush().await?;

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            QUIT_COMMAND => break,
            CLEAR_COMMAND => {
                widget.clear();
                printed = 0;
                output
                    .write_all(format!("(conversation cleared)\n{EMPTY_STATE_TEXT}\n").as_bytes())
                    .await?;
            }
            _ => {
                widget.set_input(line.as_str());
                widget.submit().await;
                printed = print_new(widget, printed, &mut output).await?;
            }
        }
        output.flush().await?;
    }

    Ok(())
}

/// Submit one question and print the resulting conversation.
pub async fn ask_once<W>(widget: &ChatWidget, question: String, mut output: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    widget.ask(question).await;
    print_new(widget, 0, &mut output).await?;
    output.flush().await
}

async fn print_new<W>(widget: &ChatWidget, from: usize, output: &mut W) -> std::io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let state = widget.snapshot();
    for message in state.messages().iter().skip(from) {
        output.write_all(render_text(message).as_bytes()).await?;
        output.write_all(b"\n").await?;
    }
    Ok(state.message_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AnswerService, Reply};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Agronomist;

    #[async_trait]
    impl AnswerService for Agronomist {
        async fn ask(&self, question: &str) -> Result<Reply> {
            Ok(Reply::Answer {
                reply: format!("About {question}: water early."),
                sources_used: 1,
                confidence: None,
            })
        }
    }

    async fn run(script: &str) -> (String, Arc<ChatWidget>) {
        let widget = Arc::new(ChatWidget::new(Arc::new(Agronomist)));
        let mut out = Vec::new();
        run_chat(&widget, script.as_bytes(), &mut out).await.unwrap();
        (String::from_utf8(out).unwrap(), widget)
    }

    #[tokio::test]
    async fn test_chat_prints_each_exchange_once() {
        let (out, widget) = run("tomatoes\n\nbeans\n").await;

        assert_eq!(out.matches("you> tomatoes").count(), 1);
        assert!(out.contains("bot> About tomatoes: water early.\n     (Sources: 1)"));
        assert!(out.contains("error> Please enter a question."));
        assert!(out.contains("you> beans"));
        assert_eq!(widget.snapshot().message_count(), 5);
    }

    #[tokio::test]
    async fn test_clear_and_quit() {
        let (out, widget) = run("tomatoes\n/clear\n/quit\nnever sent\n").await;

        assert!(out.contains("(conversation cleared)"));
        assert!(!out.contains("never sent"));
        assert!(widget.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_ask_once() {
        let widget = ChatWidget::new(Arc::new(Agronomist));
        let mut out = Vec::new();
        ask_once(&widget, "mulch".to_string(), &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out,
            "you> mulch\nbot> About mulch: water early.\n     (Sources: 1)\n"
        );
    }
}

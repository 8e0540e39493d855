//! Rendering of the conversation state.
//!
//! HTML output is driven by HTMX: the page posts the form to `/chat/ask`
//! and swaps the returned fragment into `#chatMessages`. Message text is
//! always escaped, so replies that contain markup are shown as text.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::widget::{ConversationState, Message, MessageMeta, Role};

/// Placeholder text shown before the first message.
pub const EMPTY_STATE_TEXT: &str = "Start by asking a question about smart farming!";

const EMPTY_STATE_ICON: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" fill="none" viewBox="0 0 24 24" stroke="currentColor"><path stroke-linecap="round" stroke-linejoin="round" stroke-width="2" d="M8 12h.01M12 12h.01M16 12h.01M21 12c0 4.418-4.03 8-9 8a9.863 9.863 0 01-4.255-.949L3 20l1.395-3.72C3.512 15.042 3 13.574 3 12c0-4.418 4.03-8 9-8s9 3.582 9 8z" /></svg>"#;

const LOADING_INDICATOR: &str = r#"<div class="message loading" id="loadingIndicator"><div class="typing-indicator"><span></span><span></span><span></span></div><div class="loading-label">Thinking...</div></div>"#;

/// Render the message log, or the empty state when there are no messages.
#[must_use]
pub fn render_conversation(state: &ConversationState) -> String {
    let mut html = String::new();

    if state.is_empty() {
        let _ = write!(
            html,
            r#"<div class="empty-state">{EMPTY_STATE_ICON}<p>{EMPTY_STATE_TEXT}</p></div>"#
        );
    } else {
        for message in state.messages() {
            render_message(&mut html, message);
        }
    }

    if state.controls().loading_indicator {
        html.push_str(LOADING_INDICATOR);
    }

    html
}

fn render_message(html: &mut String, message: &Message) {
    let _ = write!(
        html,
        r#"<div class="message {}">{}"#,
        message.role.as_str(),
        encode_text(&message.text)
    );
    if let Some(meta) = &message.meta {
        for line in meta_lines(meta) {
            let _ = write!(html, r#"<div class="message-meta">{line}</div>"#);
        }
    }
    html.push_str("</div>");
}

/// Annotation lines for an assistant reply.
///
/// A reply backed by zero sources gets no "Sources" line.
fn meta_lines(meta: &MessageMeta) -> Vec<String> {
    let mut lines = Vec::new();
    if meta.sources_used > 0 {
        lines.push(format!("Sources: {}", meta.sources_used));
    }
    if let Some(confidence) = meta.confidence {
        lines.push(format!("Confidence: {confidence:.2}"));
    }
    lines
}

/// Render the full chat page for a session.
#[must_use]
pub fn render_page(state: &ConversationState, session_id: &str) -> String {
    let controls = state.controls();
    let session_id = encode_double_quoted_attribute(session_id);
    let input = encode_double_quoted_attribute(&controls.input);
    let autofocus = if controls.input_focused { " autofocus" } else { "" };
    let disabled = if controls.submit_enabled { "" } else { " disabled" };
    let conversation = render_conversation(state);

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Smart Farming Assistant</title>
    <script src="https://unpkg.com/htmx.org@2.0.8"></script>
    <style>{STYLE}</style>
</head>
<body>
    <main class="chat-container">
        <header class="chat-header">
            <h1>Smart Farming Assistant</h1>
            <button type="button" class="clear-button"
                hx-post="/chat/clear"
                hx-vals='{{"session_id": "{session_id}"}}'
                hx-target="#chatMessages"
                hx-on--after-request="document.getElementById('questionInput').focus()">Clear</button>
        </header>

        <div id="chatMessages" class="chat-messages" aria-live="polite">{conversation}</div>
        <template id="loadingTemplate">{LOADING_INDICATOR}</template>

        <form class="chat-input"
            hx-post="/chat/ask"
            hx-target="#chatMessages"
            hx-sync="this:drop"
            hx-disabled-elt="find button"
            hx-on--before-request="{BEFORE_REQUEST}"
            hx-on--after-request="this.q.focus(); const log = document.getElementById('chatMessages'); log.scrollTop = log.scrollHeight">
            <input type="hidden" name="session_id" value="{session_id}">
            <input type="text" id="questionInput" name="q" value="{input}"
                placeholder="Ask about crops, diseases, irrigation..." autocomplete="off"{autofocus}>
            <button type="submit" id="askButton"{disabled}>Ask</button>
        </form>
    </main>
</body>
</html>"##
    )
}

/// Shows the question and the loading indicator in the log while the
/// request is pending. The question goes in through `textContent`, so it
/// is never parsed as markup. Empty questions are left to the server.
const BEFORE_REQUEST: &str = "const q = this.q.value.trim(); \
if (q) { \
const log = document.getElementById('chatMessages'); \
if (!log.querySelector('.message')) log.innerHTML = ''; \
const msg = document.createElement('div'); \
msg.className = 'message user'; \
msg.textContent = q; \
log.appendChild(msg); \
log.appendChild(document.getElementById('loadingTemplate').content.cloneNode(true)); \
log.scrollTop = log.scrollHeight; \
} \
this.q.value = ''";

const STYLE: &str = r"
body { font-family: system-ui, sans-serif; margin: 0; background: #f4f7f2; }
.chat-container { max-width: 48rem; margin: 0 auto; display: flex; flex-direction: column; height: 100vh; }
.chat-header { display: flex; justify-content: space-between; align-items: center; padding: 1rem; }
.chat-messages { flex: 1; overflow-y: auto; padding: 1rem; }
.message { margin: 0.5rem 0; padding: 0.75rem 1rem; border-radius: 0.75rem; white-space: pre-wrap; }
.message.user { background: #2f7d32; color: #fff; margin-left: 20%; }
.message.assistant { background: #fff; margin-right: 20%; }
.message.error { background: #fdecea; color: #b71c1c; }
.message-meta { margin-top: 0.5rem; font-size: 0.75rem; opacity: 0.7; }
.empty-state { text-align: center; color: #777; margin-top: 4rem; }
.empty-state svg { width: 3rem; height: 3rem; }
.chat-input { display: flex; gap: 0.5rem; padding: 1rem; }
.chat-input input[type=text] { flex: 1; padding: 0.75rem; }
";

/// Render one message for a terminal.
#[must_use]
pub fn render_text(message: &Message) -> String {
    let prefix = match message.role {
        Role::User => "you>",
        Role::Assistant => "bot>",
        Role::Error => "error>",
    };
    let mut out = format!("{prefix} {}", message.text.trim_end());
    if let Some(meta) = &message.meta {
        for line in meta_lines(meta) {
            let _ = write!(out, "\n     ({line})");
        }
    }
    out
}

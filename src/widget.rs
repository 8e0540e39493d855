//! The chat widget controller.
//!
//! [`ChatWidget`] owns one conversation and drives the submit cycle:
//! validate the input, append the user's question, call the answer
//! service, append the reply or an error, and restore the controls.
//!
//! The widget is headless. Front-ends feed it input through
//! [`ChatWidget::set_input`] and read back a [`ConversationState`] snapshot
//! to render. A widget can be shared between tasks behind an `Arc`; the
//! loading flag is checked and set under the state lock before the request
//! starts, so at most one request is ever in flight per widget.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::client::{AnswerService, Reply};

/// Shown when the user submits an empty or whitespace-only question.
pub const EMPTY_QUESTION: &str = "Please enter a question.";

/// Who a message is attributed to; controls its styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Error,
}

impl Role {
    /// CSS class of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Error => "error",
        }
    }
}

/// Auxiliary annotation shown under assistant replies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageMeta {
    pub sources_used: u64,
    pub confidence: Option<f64>,
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub role: Role,
    pub meta: Option<MessageMeta>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Role::User,
            meta: None,
        }
    }

    pub fn assistant(text: impl Into<String>, meta: MessageMeta) -> Self {
        Self {
            text: text.into(),
            role: Role::Assistant,
            meta: Some(meta),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role: Role::Error,
            meta: None,
        }
    }
}

/// Observable state of the input controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    /// Current value of the text field.
    pub input: String,
    pub submit_enabled: bool,
    pub input_focused: bool,
    /// Whether the "Thinking..." indicator is shown.
    pub loading_indicator: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            input: String::new(),
            submit_enabled: true,
            input_focused: true,
            loading_indicator: false,
        }
    }
}

/// Everything a front-end needs to draw the widget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    message_count: usize,
    is_loading: bool,
    messages: Vec<Message>,
    controls: Controls,
}

impl ConversationState {
    /// Number of messages appended since the last clear.
    pub fn message_count(&self) -> usize {
        self.message_count
    }

    /// True exactly while a request is in flight.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// True when the empty-state placeholder should be shown.
    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    fn push(&mut self, message: Message) {
        self.message_count += 1;
        self.messages.push(message);
    }
}

/// Which path a call to [`ChatWidget::submit`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The input was empty; a validation message was appended.
    Invalid,
    /// A request was already in flight; nothing happened.
    Busy,
    /// The service answered; an assistant message was appended.
    Answered,
    /// The service reported a failure; its message was appended.
    ServerError,
    /// The request could not complete; a network error was appended.
    TransportError,
}

/// Interactive chat controller bound to one answer service.
pub struct ChatWidget {
    service: Arc<dyn AnswerService>,
    state: Mutex<ConversationState>,
}

impl std::fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

/// Restores the controls when the submit cycle ends, however it ends.
struct LoadingGuard<'a> {
    widget: &'a ChatWidget,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.widget.lock();
        state.is_loading = false;
        state.controls.loading_indicator = false;
        state.controls.submit_enabled = true;
        state.controls.input_focused = true;
    }
}

impl ChatWidget {
    /// Create a widget with an empty conversation.
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            service,
            state: Mutex::new(ConversationState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the text field's value.
    pub fn set_input(&self, text: impl Into<String>) {
        self.lock().controls.input = text.into();
    }

    /// Copy of the current state for rendering.
    pub fn snapshot(&self) -> ConversationState {
        self.lock().clone()
    }

    /// Set the input and submit it.
    ///
    /// The input is replaced under the same lock that validates and gates
    /// the request, so a concurrent `set_input` cannot swap the question.
    pub async fn ask(&self, question: impl Into<String>) -> SubmitOutcome {
        self.run(Some(question.into())).await
    }

    /// Submit the current input as a question.
    pub async fn submit(&self) -> SubmitOutcome {
        self.run(None).await
    }

    async fn run(&self, input: Option<String>) -> SubmitOutcome {
        let (question, _guard) = {
            let mut state = self.lock();
            if let Some(input) = input {
                state.controls.input = input;
            }
            let question = state.controls.input.trim().to_string();

            if question.is_empty() {
                state.push(Message::error(EMPTY_QUESTION));
                return SubmitOutcome::Invalid;
            }
            if state.is_loading {
                debug!(name: "chat.submit.busy", "Request already in flight");
                return SubmitOutcome::Busy;
            }

            state.controls.input.clear();
            state.push(Message::user(question.clone()));
            state.is_loading = true;
            state.controls.submit_enabled = false;
            state.controls.input_focused = false;
            state.controls.loading_indicator = true;

            (question, LoadingGuard { widget: self })
        };

        info!(
            name: "chat.question.submitted",
            chars = question.chars().count(),
            "Question submitted"
        );

        let result = self.service.ask(&question).await;

        let mut state = self.lock();
        state.controls.loading_indicator = false;
        match result {
            Ok(Reply::Answer {
                reply,
                sources_used,
                confidence,
            }) => {
                info!(
                    name: "chat.answer.received",
                    sources_used,
                    "Answer received"
                );
                state.push(Message::assistant(
                    reply,
                    MessageMeta {
                        sources_used,
                        confidence,
                    },
                ));
                SubmitOutcome::Answered
            }
            Ok(Reply::Rejected { status, message }) => {
                warn!(
                    name: "chat.answer.rejected",
                    status,
                    message = %message,
                    "Answer service reported an error"
                );
                state.push(Message::error(message));
                SubmitOutcome::ServerError
            }
            Err(err) => {
                error!(name: "chat.request.failed", error = %err, "Request failed");
                state.push(Message::error(format!(
                    "Network error: {err}. Please check your connection and try again."
                )));
                SubmitOutcome::TransportError
            }
        }
    }

    /// Drop every message and go back to the empty state.
    ///
    /// A request still in flight keeps the controls disabled; its reply
    /// lands in the fresh log.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.messages.clear();
        state.message_count = 0;
        state.controls.loading_indicator = false;
        state.controls.input_focused = true;
        debug!(name: "chat.cleared", "Conversation cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Replays canned results in order.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<Reply>>>,
        questions: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn with(replies: Vec<Result<Reply>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                questions: Mutex::default(),
            })
        }

        fn calls(&self) -> usize {
            self.questions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AnswerService for Scripted {
        async fn ask(&self, question: &str) -> Result<Reply> {
            self.questions.lock().unwrap().push(question.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected request")
        }
    }

    /// Holds every request open until released.
    #[derive(Default)]
    struct Stalled {
        started: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnswerService for Stalled {
        async fn ask(&self, _question: &str) -> Result<Reply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            self.release.notified().await;
            Ok(Reply::Answer {
                reply: "done".to_string(),
                sources_used: 1,
                confidence: None,
            })
        }
    }

    fn answer(reply: &str, sources_used: u64) -> Result<Reply> {
        Ok(Reply::Answer {
            reply: reply.to_string(),
            sources_used,
            confidence: None,
        })
    }

    fn decode_error() -> ClientError {
        ClientError::Decode(serde_json::from_str::<serde_json::Value>("{").unwrap_err())
    }

    fn assert_controls_restored(state: &ConversationState) {
        assert!(!state.is_loading());
        assert!(state.controls().submit_enabled);
        assert!(state.controls().input_focused);
        assert!(!state.controls().loading_indicator);
    }

    #[test]
    fn test_initial_state() {
        let widget = ChatWidget::new(Scripted::with(vec![]));
        let state = widget.snapshot();
        assert!(state.is_empty());
        assert_eq!(state.message_count(), 0);
        assert_controls_restored(&state);
    }

    #[tokio::test]
    async fn test_empty_input_never_calls_service() {
        let service = Scripted::with(vec![]);
        let widget = ChatWidget::new(service.clone());

        assert_eq!(widget.ask("   \t ").await, SubmitOutcome::Invalid);

        let state = widget.snapshot();
        assert_eq!(state.messages(), &[Message::error(EMPTY_QUESTION)]);
        assert_eq!(service.calls(), 0);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn test_successful_answer() {
        let service = Scripted::with(vec![answer(
            "Drip irrigation delivers water directly to roots.",
            3,
        )]);
        let widget = ChatWidget::new(service.clone());

        let outcome = widget.ask("  What is drip irrigation?  ").await;
        assert_eq!(outcome, SubmitOutcome::Answered);

        let state = widget.snapshot();
        assert_eq!(state.message_count(), 2);
        assert_eq!(
            state.messages()[0],
            Message::user("What is drip irrigation?")
        );
        assert_eq!(
            state.messages()[1],
            Message::assistant(
                "Drip irrigation delivers water directly to roots.",
                MessageMeta {
                    sources_used: 3,
                    confidence: None
                }
            )
        );
        assert_eq!(state.controls().input, "");
        assert_controls_restored(&state);
        assert_eq!(
            service.questions.lock().unwrap().as_slice(),
            ["What is drip irrigation?"]
        );
    }

    #[tokio::test]
    async fn test_server_error_keeps_question() {
        let service = Scripted::with(vec![Ok(Reply::Rejected {
            status: 429,
            message: "rate limited".to_string(),
        })]);
        let widget = ChatWidget::new(service);

        assert_eq!(widget.ask("soil ph").await, SubmitOutcome::ServerError);

        let state = widget.snapshot();
        assert_eq!(
            state.messages(),
            &[Message::user("soil ph"), Message::error("rate limited")]
        );
        assert_controls_restored(&state);
    }

    #[tokio::test]
    async fn test_transport_error_message() {
        let service = Scripted::with(vec![Err(decode_error())]);
        let widget = ChatWidget::new(service);

        assert_eq!(widget.ask("soil ph").await, SubmitOutcome::TransportError);

        let state = widget.snapshot();
        let last = state.messages().last().unwrap();
        assert_eq!(last.role, Role::Error);
        assert!(last.text.starts_with("Network error: invalid response from server"));
        assert!(last
            .text
            .ends_with(". Please check your connection and try again."));
        assert_controls_restored(&state);
    }

    #[tokio::test]
    async fn test_second_submit_while_loading_is_noop() {
        let service = Arc::new(Stalled::default());
        let widget = Arc::new(ChatWidget::new(service.clone()));

        let first = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.ask("first").await }
        });
        service.started.notified().await;

        let state = widget.snapshot();
        assert!(state.is_loading());
        assert!(!state.controls().submit_enabled);
        assert!(state.controls().loading_indicator);

        assert_eq!(widget.ask("second").await, SubmitOutcome::Busy);
        assert_eq!(widget.snapshot().message_count(), 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        service.release.notify_one();
        assert_eq!(first.await.unwrap(), SubmitOutcome::Answered);

        let state = widget.snapshot();
        assert_eq!(state.message_count(), 2);
        assert_controls_restored(&state);
    }

    #[tokio::test]
    async fn test_empty_input_while_loading_still_reports() {
        let service = Arc::new(Stalled::default());
        let widget = Arc::new(ChatWidget::new(service.clone()));

        let first = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.ask("first").await }
        });
        service.started.notified().await;

        assert_eq!(widget.ask("").await, SubmitOutcome::Invalid);
        assert!(widget.snapshot().is_loading());

        service.release.notify_one();
        first.await.unwrap();
        assert_eq!(widget.snapshot().message_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_submit_restores_controls() {
        let service = Arc::new(Stalled::default());
        let widget = Arc::new(ChatWidget::new(service.clone()));

        let pending = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.ask("abandoned").await }
        });
        service.started.notified().await;
        pending.abort();
        let _ = pending.await;

        let state = widget.snapshot();
        assert_eq!(state.messages(), &[Message::user("abandoned")]);
        assert_controls_restored(&state);
    }

    #[tokio::test]
    async fn test_clear_resets_conversation() {
        let service = Scripted::with(vec![answer("one", 1), answer("two", 0)]);
        let widget = ChatWidget::new(service);

        widget.ask("q1").await;
        widget.ask("q2").await;
        widget.ask("").await;
        assert_eq!(widget.snapshot().message_count(), 5);

        widget.clear();

        let state = widget.snapshot();
        assert!(state.is_empty());
        assert!(state.messages().is_empty());
        assert!(state.controls().input_focused);
    }

    #[tokio::test]
    async fn test_clear_while_loading_hides_indicator() {
        let service = Arc::new(Stalled::default());
        let widget = Arc::new(ChatWidget::new(service.clone()));

        let pending = tokio::spawn({
            let widget = Arc::clone(&widget);
            async move { widget.ask("first").await }
        });
        service.started.notified().await;

        widget.clear();

        let state = widget.snapshot();
        assert!(state.is_empty());
        assert!(!state.controls().loading_indicator);
        assert!(state.is_loading());
        assert!(!state.controls().submit_enabled);

        service.release.notify_one();
        assert_eq!(pending.await.unwrap(), SubmitOutcome::Answered);

        let state = widget.snapshot();
        assert_eq!(state.message_count(), 1);
        assert_eq!(state.messages()[0].role, Role::Assistant);
        assert_controls_restored(&state);
    }

    /// Answers everything and records what it was asked.
    #[derive(Default)]
    struct Recorder {
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AnswerService for Recorder {
        async fn ask(&self, question: &str) -> Result<Reply> {
            self.questions.lock().unwrap().push(question.to_string());
            answer("ok", 0)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ask_sends_its_own_question_despite_concurrent_typing() {
        for _ in 0..200 {
            let service = Arc::new(Recorder::default());
            let widget = Arc::new(ChatWidget::new(service.clone()));
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let asker = tokio::spawn({
                let widget = Arc::clone(&widget);
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    widget.ask("mine").await
                }
            });
            let typist = tokio::spawn({
                let widget = Arc::clone(&widget);
                let barrier = Arc::clone(&barrier);
                async move {
                    barrier.wait().await;
                    widget.set_input("theirs");
                }
            });

            assert_eq!(asker.await.unwrap(), SubmitOutcome::Answered);
            typist.await.unwrap();

            assert_eq!(service.questions.lock().unwrap().as_slice(), ["mine"]);
            assert_eq!(widget.snapshot().messages()[0], Message::user("mine"));
        }
    }
}

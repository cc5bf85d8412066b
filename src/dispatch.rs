//! Turn dispatch: send a thread's history plus new input to the model and
//! append the exchange only once the reply is in hand.

use crate::error::SubmitError;
use crate::gemini::{ModelEndpoint, Part};
use crate::session::{ConversationThread, Turn};

/// Outbound request captured from a thread. Owns its data so it can be moved
/// into a background task.
#[derive(Debug, Clone)]
pub struct Submission {
    base_revision: u64,
    history: Vec<Turn>,
    text: String,
}

impl Submission {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }
}

/// A completed round trip that has not been appended yet.
#[derive(Debug, Clone)]
pub struct Exchange {
    base_revision: u64,
    user: Turn,
    reply: Turn,
}

impl Exchange {
    pub fn reply(&self) -> &Turn {
        &self.reply
    }
}

pub fn prepare(thread: &ConversationThread, text: &str) -> Result<Submission, SubmitError> {
    if text.trim().is_empty() {
        return Err(SubmitError::MissingInput("Type a message first"));
    }

    Ok(Submission {
        base_revision: thread.revision(),
        history: thread.turns().to_vec(),
        text: text.to_string(),
    })
}

pub async fn send<E: ModelEndpoint>(endpoint: &E, submission: Submission) -> Result<Exchange, SubmitError> {
    let content = [Part::Text(submission.text.clone())];
    let reply = endpoint.generate(&submission.history, &content).await?;

    Ok(Exchange {
        base_revision: submission.base_revision,
        user: Turn::user(submission.text),
        reply: Turn::model(reply),
    })
}

/// Appends both turns of `exchange`, or nothing if the thread moved on since
/// the submission was prepared.
pub fn commit(thread: &mut ConversationThread, exchange: Exchange) -> Result<&Turn, SubmitError> {
    if thread.revision() != exchange.base_revision {
        tracing::warn!(
            expected = exchange.base_revision,
            actual = thread.revision(),
            "dropping reply for a conversation that changed"
        );
        return Err(SubmitError::Stale);
    }
    Ok(thread.append_exchange(exchange.user, exchange.reply))
}

/// Prepare, send and commit in one step.
pub async fn submit<E: ModelEndpoint>(
    thread: &mut ConversationThread,
    endpoint: &E,
    text: &str,
) -> Result<Turn, SubmitError> {
    let submission = prepare(thread, text)?;
    let exchange = send(endpoint, submission).await?;
    commit(thread, exchange).cloned()
}

/// One-shot question about an image. Nothing is recorded.
pub async fn ask_about_image<E: ModelEndpoint>(
    endpoint: &E,
    prompt: &str,
    mime_type: &str,
    image: Vec<u8>,
) -> Result<String, SubmitError> {
    if prompt.trim().is_empty() {
        return Err(SubmitError::MissingInput("Please provide both an image and a prompt"));
    }

    let content = [
        Part::Text(prompt.to_string()),
        Part::InlineData { mime_type: mime_type.to_string(), data: image },
    ];
    Ok(endpoint.generate(&[], &content).await?)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::error::EndpointError;
    use crate::gemini::{ModelEndpoint, Part};
    use crate::session::Turn;

    /// Replays canned replies and records what it was asked.
    #[derive(Clone, Default)]
    pub struct ScriptedEndpoint {
        replies: Arc<Mutex<VecDeque<Result<String, EndpointError>>>>,
        pub calls: Arc<Mutex<Vec<(Vec<Turn>, Vec<Part>)>>>,
    }

    impl ScriptedEndpoint {
        pub fn new(replies: Vec<Result<String, EndpointError>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                calls: Arc::default(),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ModelEndpoint for ScriptedEndpoint {
        async fn generate(&self, history: &[Turn], content: &[Part]) -> Result<String, EndpointError> {
            self.calls.lock().unwrap().push((history.to_vec(), content.to_vec()));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(EndpointError::EmptyResponse))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedEndpoint;
    use super::*;
    use crate::error::EndpointError;
    use crate::render::{render_thread, DisplayRole};
    use crate::session::{Role, SessionStore, ThreadKey};

    #[tokio::test]
    async fn test_submit_hello() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("Hi there".into())]);
        let mut store = SessionStore::new();
        let thread = store.get_or_create_thread(ThreadKey::Chat);

        let reply = submit(thread, &endpoint, "Hello").await.unwrap();
        assert_eq!(reply, Turn::model("Hi there"));

        let rendered: Vec<_> = render_thread(thread)
            .into_iter()
            .map(|t| (t.role, t.content))
            .collect();
        assert_eq!(
            rendered,
            [(DisplayRole::User, "Hello"), (DisplayRole::Assistant, "Hi there")]
        );
    }

    #[tokio::test]
    async fn test_history_is_resent_in_order() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("one".into()), Ok("two".into()), Ok("three".into())]);
        let mut thread = ConversationThread::default();

        for prompt in ["a", "b", "c"] {
            submit(&mut thread, &endpoint, prompt).await.unwrap();
        }

        let calls = endpoint.calls.lock().unwrap();
        assert_eq!(calls[0].0, Vec::<Turn>::new());
        assert_eq!(calls[2].0, vec![Turn::user("a"), Turn::model("one"), Turn::user("b"), Turn::model("two")]);
        assert_eq!(calls[2].1, vec![Part::Text("c".into())]);

        let contents: Vec<_> = thread.turns().iter().map(Turn::content).collect();
        assert_eq!(contents, ["a", "one", "b", "two", "c", "three"]);
    }

    #[tokio::test]
    async fn test_failed_submit_leaves_thread_unchanged() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok("first".into()),
            Err(EndpointError::Network("connection reset".into())),
        ]);
        let mut thread = ConversationThread::default();
        submit(&mut thread, &endpoint, "q1").await.unwrap();
        let revision = thread.revision();

        let err = submit(&mut thread, &endpoint, "q2").await.unwrap_err();
        assert!(matches!(err, SubmitError::Endpoint(EndpointError::Network(_))));
        assert_eq!(thread.len(), 2);
        assert_eq!(thread.revision(), revision);
    }

    #[tokio::test]
    async fn test_clear_then_submit_starts_fresh() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("x".into()), Ok("y".into())]);
        let mut store = SessionStore::new();
        submit(store.get_or_create_thread(ThreadKey::Pdf), &endpoint, "doc text").await.unwrap();

        store.clear(ThreadKey::Pdf);
        let thread = store.get_or_create_thread(ThreadKey::Pdf);
        submit(thread, &endpoint, "again").await.unwrap();

        assert_eq!(thread.turns()[0], Turn::user("again"));
        assert_eq!(thread.len(), 2);
        assert!(endpoint.calls.lock().unwrap()[1].0.is_empty());
    }

    #[tokio::test]
    async fn test_blank_input_makes_no_call() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("unused".into())]);
        let mut thread = ConversationThread::default();

        let err = submit(&mut thread, &endpoint, "   ").await.unwrap_err();
        assert!(matches!(err, SubmitError::MissingInput(_)));
        assert_eq!(endpoint.call_count(), 0);
        assert!(thread.is_empty());
    }

    #[tokio::test]
    async fn test_commit_refuses_stale_exchange() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("late".into())]);
        let mut thread = ConversationThread::default();

        let submission = prepare(&thread, "question").unwrap();
        let exchange = send(&endpoint, submission).await.unwrap();
        thread.clear();

        assert!(matches!(commit(&mut thread, exchange), Err(SubmitError::Stale)));
        assert!(thread.is_empty());
    }

    #[tokio::test]
    async fn test_ask_about_image_requires_prompt() {
        let endpoint = ScriptedEndpoint::new(vec![Ok("a cat".into())]);

        let err = ask_about_image(&endpoint, "", "image/png", vec![0u8; 4]).await.unwrap_err();
        assert!(matches!(err, SubmitError::MissingInput(_)));
        assert_eq!(endpoint.call_count(), 0);

        let answer = ask_about_image(&endpoint, "What is it?", "image/png", vec![9]).await.unwrap();
        assert_eq!(answer, "a cat");
        let calls = endpoint.calls.lock().unwrap();
        assert!(calls[0].0.is_empty());
        assert_eq!(
            calls[0].1[1],
            Part::InlineData { mime_type: "image/png".into(), data: vec![9] }
        );
    }

    #[test]
    fn test_exchange_reply_role() {
        let exchange = Exchange { base_revision: 0, user: Turn::user("u"), reply: Turn::model("m") };
        assert_eq!(exchange.reply().role(), Role::Model);
    }
}

//! Chat orchestrator for Warechat.
//!
//! Runs one chat request through the pipeline: resolve the chunk, fetch and
//! merge its transcript, build the context with prior turns, call the model,
//! then record the new turns.

use crate::chunk::{Chunk, ChunkKey, ChunkResolver, SqliteChunkStore, TranscriptLocation};
use crate::config::{Prompts, Settings};
use crate::context::{ContextBudget, ContextBuilder};
use crate::conversation::{
    create_conversation_store, ConversationKey, ConversationStore, TransactionId, Turn,
};
use crate::error::{ErrorKind, Result, WarechatError};
use crate::inference::{
    InferenceConfig, InferenceGateway, InferenceOverrides, InferenceRequest, OpenAIGateway, Usage,
};
use crate::object_store::create_object_store;
use crate::transcript::{merge, TranscriptFetcher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatStage {
    Resolving,
    Fetching,
    Merging,
    BuildingContext,
    Inferring,
    Recording,
    Done,
}

impl ChatStage {
    /// The stage that follows this one. `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            ChatStage::Resolving => ChatStage::Fetching,
            ChatStage::Fetching => ChatStage::Merging,
            ChatStage::Merging => ChatStage::BuildingContext,
            ChatStage::BuildingContext => ChatStage::Inferring,
            ChatStage::Inferring => ChatStage::Recording,
            ChatStage::Recording | ChatStage::Done => ChatStage::Done,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStage::Resolving => "resolving",
            ChatStage::Fetching => "fetching",
            ChatStage::Merging => "merging",
            ChatStage::BuildingContext => "building_context",
            ChatStage::Inferring => "inferring",
            ChatStage::Recording => "recording",
            ChatStage::Done => "done",
        }
    }
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question about one chunk.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub chunk: ChunkKey,
    pub question: String,
    /// Conversation to continue; a fresh id is generated when absent or blank.
    pub transaction_id: Option<String>,
    /// Prior turns supplied by the caller, used when the store has none.
    pub conversation: Vec<Turn>,
    pub inference: InferenceOverrides,
    pub context_budget: Option<ContextBudget>,
}

impl ChatRequest {
    pub fn new(chunk: ChunkKey, question: impl Into<String>) -> Self {
        Self {
            chunk,
            question: question.into(),
            transaction_id: None,
            conversation: Vec::new(),
            inference: InferenceOverrides::default(),
            context_budget: None,
        }
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }
}

/// A successful chat answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub transaction_id: TransactionId,
    pub answer: String,
    /// Prior turns, the new question and the answer, oldest first.
    pub conversation: Vec<Turn>,
    pub usage: Option<Usage>,
    pub model: String,
    /// Effective inference parameters.
    pub inference: InferenceConfig,
    /// Some transcript parts could not be used.
    pub partial_transcript: bool,
    pub answered_at: DateTime<Utc>,
    /// The new turns were stored for the next call.
    pub recorded: bool,
}

/// A failed chat: the error, where it happened, and the conversation id if
/// one was assigned.
#[derive(Debug, thiserror::Error)]
#[error("chat failed while {stage}: {error}")]
pub struct ChatFailure {
    pub transaction_id: Option<TransactionId>,
    pub stage: ChatStage,
    #[source]
    pub error: WarechatError,
}

impl ChatFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Sequences the chat pipeline over injected components.
pub struct ChatOrchestrator {
    resolver: Arc<dyn ChunkResolver>,
    fetcher: TranscriptFetcher,
    conversations: Arc<dyn ConversationStore>,
    gateway: Arc<dyn InferenceGateway>,
    context_builder: ContextBuilder,
    inference_defaults: InferenceConfig,
    budget: ContextBudget,
}

impl ChatOrchestrator {
    /// Create an orchestrator with the backends named in settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let resolver: Arc<dyn ChunkResolver> =
            Arc::new(SqliteChunkStore::new(&settings.chunks_path())?);
        let store = create_object_store(settings)?;
        let fetcher = TranscriptFetcher::from_settings(store, &settings.object_store)?;
        let conversations = create_conversation_store(settings)?;
        let gateway: Arc<dyn InferenceGateway> = Arc::new(OpenAIGateway::new(&settings.inference)?);

        info!(
            "Chat pipeline ready (object store: {}, conversations: {:?}, model: {})",
            settings.object_store.provider, settings.conversation.backend, settings.inference.model
        );

        Ok(Self::with_components(resolver, fetcher, conversations, gateway, prompts)
            .with_inference_defaults(InferenceConfig::from_settings(&settings.inference))
            .with_budget(ContextBudget::from(&settings.context)))
    }

    /// Create an orchestrator with custom components and default limits.
    pub fn with_components(
        resolver: Arc<dyn ChunkResolver>,
        fetcher: TranscriptFetcher,
        conversations: Arc<dyn ConversationStore>,
        gateway: Arc<dyn InferenceGateway>,
        prompts: Prompts,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            conversations,
            gateway,
            context_builder: ContextBuilder::new(prompts),
            inference_defaults: InferenceConfig::default(),
            budget: ContextBudget::default(),
        }
    }

    pub fn with_inference_defaults(mut self, config: InferenceConfig) -> Self {
        self.inference_defaults = config;
        self
    }

    pub fn with_budget(mut self, budget: ContextBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Look up a chunk record without running the pipeline.
    pub async fn chunk(&self, key: &ChunkKey) -> Result<Chunk> {
        self.resolver.resolve(key).await
    }

    /// Answer one question about a chunk.
    ///
    /// The transaction id is settled before any external call, so every
    /// failure after that point carries it back to the caller.
    #[instrument(skip(self, request), fields(chunk = %request.chunk))]
    pub async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatReply, ChatFailure> {
        let supplied = request
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let transaction_id = match supplied {
            Some(id) => TransactionId::parse(id).map_err(|error| ChatFailure {
                transaction_id: None,
                stage: ChatStage::Resolving,
                error,
            })?,
            None => TransactionId::generate(),
        };

        let mut stage = ChatStage::Resolving;
        match self.run(&request, &transaction_id, &mut stage).await {
            Ok(reply) => {
                info!(transaction_id = %transaction_id, "Chat answered");
                Ok(reply)
            }
            Err(error) => {
                warn!(
                    transaction_id = %transaction_id,
                    stage = %stage,
                    kind = %error.kind(),
                    "Chat failed: {}",
                    error
                );
                Err(ChatFailure {
                    transaction_id: Some(transaction_id),
                    stage,
                    error,
                })
            }
        }
    }

    async fn run(
        &self,
        request: &ChatRequest,
        transaction_id: &TransactionId,
        stage: &mut ChatStage,
    ) -> Result<ChatReply> {
        let question = request.question.trim();
        if question.is_empty() {
            return Err(WarechatError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        let config = self.inference_defaults.apply(&request.inference)?;
        let budget = request.context_budget.unwrap_or(self.budget);

        let chunk = self.resolver.resolve(&request.chunk).await?;
        advance(stage);

        let reference = chunk
            .transcript_location
            .as_deref()
            .filter(|loc| !loc.trim().is_empty())
            .ok_or_else(|| {
                WarechatError::TranscriptLocationAbsent(format!(
                    "chunk {} has no transcript location",
                    chunk.key
                ))
            })?;
        let location = TranscriptLocation::parse(reference)?;
        let fetched = self.fetcher.fetch_parts(&location).await?;
        advance(stage);

        let transcript = merge(fetched.parts, fetched.skipped);
        if transcript.is_empty() {
            return Err(WarechatError::NoTranscriptAvailable(format!(
                "no transcript parts under {}",
                location
            )));
        }
        if transcript.is_partial() {
            warn!(
                "Transcript is partial: {} of {} parts skipped",
                transcript.skipped.len(),
                transcript.skipped.len() + transcript.part_names.len()
            );
        }
        advance(stage);

        let key = ConversationKey::new(request.chunk.clone(), transaction_id.clone());
        let stored = self.conversations.get_history(&key).await?;
        let seeded = stored.is_empty() && !request.conversation.is_empty();
        let history = if seeded {
            request.conversation.clone()
        } else {
            stored
        };

        let context =
            self.context_builder
                .build(&transcript, Some(&chunk), &history, question, &budget)?;
        advance(stage);

        let result = self
            .gateway
            .infer(&InferenceRequest {
                context,
                config: config.clone(),
            })
            .await?;
        advance(stage);

        let question_turn = Turn::user(question);
        let answer_turn = Turn::assistant(result.answer.clone());
        let answered_at = answer_turn.timestamp;

        let seed = if seeded { history.clone() } else { Vec::new() };
        let new_turns = vec![question_turn.clone(), answer_turn.clone()];
        let recorded = self.record(key, seed, new_turns).await;
        advance(stage);

        let mut conversation = history;
        conversation.push(question_turn);
        conversation.push(answer_turn);

        let model = if result.model.is_empty() {
            config.model.clone()
        } else {
            result.model
        };

        Ok(ChatReply {
            transaction_id: transaction_id.clone(),
            answer: result.answer,
            conversation,
            usage: result.usage,
            model,
            inference: config,
            partial_transcript: transcript.is_partial(),
            answered_at,
            recorded,
        })
    }

    /// Append turns on a task of their own so that, once started, recording
    /// finishes even if the caller goes away. A non-empty `seed` is written
    /// first, only if the conversation is still empty. Failures are logged,
    /// not returned.
    async fn record(&self, key: ConversationKey, seed: Vec<Turn>, turns: Vec<Turn>) -> bool {
        let store = Arc::clone(&self.conversations);
        let handle = tokio::spawn(async move {
            if seed.is_empty() {
                store.append(&key, &turns).await
            } else {
                store.append_seeded(&key, &seed, &turns).await
            }
        });

        match handle.await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(kind = %ErrorKind::ConversationRecordingFailure, "Failed to record turns: {}", e);
                false
            }
            Err(e) => {
                error!(kind = %ErrorKind::ConversationRecordingFailure, "Recording task failed: {}", e);
                false
            }
        }
    }
}

fn advance(stage: &mut ChatStage) {
    let next = stage.next();
    debug!("{} -> {}", stage, next);
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MemoryChunkStore;
    use crate::conversation::{MemoryConversationStore, Role};
    use crate::inference::InferenceResult;
    use crate::object_store::{MemoryObjectStore, ObjectEntry, ObjectStore, ObjectStoreError, StoreResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const LOCATION: &str = "https://acct.blob.core.windows.net/transcripts/wh1/cam1/c1/";

    /// Gateway that replays scripted outcomes and keeps every request.
    struct ScriptedGateway {
        replies: Mutex<VecDeque<Result<InferenceResult>>>,
        requests: Mutex<Vec<InferenceRequest>>,
    }

    impl ScriptedGateway {
        fn new(replies: Vec<Result<InferenceResult>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn answering(answers: &[&str]) -> Self {
            Self::new(answers.iter().map(|a| Ok(answer(a))).collect())
        }

        fn requests(&self) -> Vec<InferenceRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceGateway for ScriptedGateway {
        async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResult> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(WarechatError::InferenceService("no scripted reply".into())))
        }
    }

    struct BrokenConversationStore;

    #[async_trait]
    impl ConversationStore for BrokenConversationStore {
        async fn get_history(&self, _key: &ConversationKey) -> Result<Vec<Turn>> {
            Ok(Vec::new())
        }

        async fn append(&self, _key: &ConversationKey, _turns: &[Turn]) -> Result<()> {
            Err(WarechatError::ConversationRecording("disk full".to_string()))
        }
    }

    /// Object store that rejects every request.
    struct DeniedObjectStore;

    #[async_trait]
    impl ObjectStore for DeniedObjectStore {
        async fn list(&self, _container: &str, _prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
            Err(ObjectStoreError::Permanent("403 AuthorizationFailure".to_string()))
        }

        async fn get(&self, _container: &str, name: &str) -> StoreResult<Vec<u8>> {
            Err(ObjectStoreError::Permanent(format!("403 on {}", name)))
        }
    }

    fn answer(text: &str) -> InferenceResult {
        InferenceResult {
            answer: text.to_string(),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 2,
                total_tokens: 12,
            }),
            model: "test-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    fn key() -> ChunkKey {
        ChunkKey::new("wh1", "cam1", "c1")
    }

    struct Fixture {
        chunks: Arc<MemoryChunkStore>,
        objects: Arc<MemoryObjectStore>,
        conversations: Arc<dyn ConversationStore>,
        gateway: Arc<ScriptedGateway>,
    }

    impl Fixture {
        fn new(gateway: ScriptedGateway) -> Self {
            let chunks = Arc::new(MemoryChunkStore::new());
            chunks.insert(Chunk::new(key(), Some(LOCATION.to_string())));
            Self {
                chunks,
                objects: Arc::new(MemoryObjectStore::new()),
                conversations: Arc::new(MemoryConversationStore::new()),
                gateway: Arc::new(gateway),
            }
        }

        fn with_conversations(mut self, store: Arc<dyn ConversationStore>) -> Self {
            self.conversations = store;
            self
        }

        fn put_part(&self, start: u32, text: &str) {
            let body = serde_json::json!([{ "summary": text }]).to_string();
            self.objects.put(
                "transcripts",
                &format!("wh1/cam1/c1/ts_c1_chunk_start-{}_file.json", start),
                body,
            );
        }

        fn put_raw_part(&self, start: u32, body: &str) {
            self.objects.put(
                "transcripts",
                &format!("wh1/cam1/c1/ts_c1_chunk_start-{}_file.json", start),
                body.to_string(),
            );
        }

        fn orchestrator(&self) -> ChatOrchestrator {
            ChatOrchestrator::with_components(
                self.chunks.clone(),
                TranscriptFetcher::new(self.objects.clone()),
                self.conversations.clone(),
                self.gateway.clone(),
                Prompts::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_chunk_not_found_short_circuits() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));
        let orchestrator = fx.orchestrator();

        let failure = orchestrator
            .chat(ChatRequest::new(ChunkKey::new("wh1", "cam1", "missing"), "What happened?"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::ChunkNotFound);
        assert_eq!(failure.stage, ChatStage::Resolving);
        let id = failure.transaction_id.expect("id assigned before lookup");
        assert_eq!(id.as_str().len(), 32);
        assert_eq!(fx.chunks.lookups(), 1);
        assert_eq!(fx.objects.calls(), 0);
        assert!(fx.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_parts_merged_in_key_order() {
        let fx = Fixture::new(ScriptedGateway::answering(&["Two forklifts."]));
        fx.put_part(2, "...intro");
        fx.put_part(1, "...continued");

        let reply = fx
            .orchestrator()
            .chat(ChatRequest::new(key(), "How many forklifts?"))
            .await
            .unwrap();

        assert_eq!(reply.answer, "Two forklifts.");
        assert!(reply.recorded);
        assert!(!reply.partial_transcript);

        let system = &fx.gateway.requests()[0].context.system;
        let continued = system.find("...continued").unwrap();
        let intro = system.find("...intro").unwrap();
        assert!(continued < intro);
    }

    #[tokio::test]
    async fn test_undecodable_part_gives_partial_answer() {
        let fx = Fixture::new(ScriptedGateway::answering(&["One pallet."]));
        fx.put_part(0, "one pallet moved");
        fx.put_raw_part(30, "{broken");

        let reply = fx
            .orchestrator()
            .chat(ChatRequest::new(key(), "What moved?"))
            .await
            .unwrap();

        assert_eq!(reply.answer, "One pallet.");
        assert!(reply.partial_transcript);
        let system = &fx.gateway.requests()[0].context.system;
        assert!(system.contains("one pallet moved"));
        assert!(!system.contains("{broken"));
    }

    #[tokio::test]
    async fn test_all_parts_undecodable_fails_while_fetching() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));
        fx.put_raw_part(0, "{broken");
        fx.put_raw_part(30, "not json either");

        let failure = fx
            .orchestrator()
            .chat(ChatRequest::new(key(), "Anything?").with_transaction_id("shift-2"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::TranscriptMergeFailure);
        assert_eq!(failure.stage, ChatStage::Fetching);
        assert_eq!(failure.transaction_id.unwrap().as_str(), "shift-2");
        assert!(fx.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_store_fails_while_fetching() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));
        let orchestrator = ChatOrchestrator::with_components(
            fx.chunks.clone(),
            TranscriptFetcher::new(Arc::new(DeniedObjectStore)),
            fx.conversations.clone(),
            fx.gateway.clone(),
            Prompts::default(),
        );

        let failure = orchestrator
            .chat(ChatRequest::new(key(), "Anything?").with_transaction_id("shift-3"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::TranscriptStoreUnavailable);
        assert_eq!(failure.stage, ChatStage::Fetching);
        assert_eq!(failure.transaction_id.unwrap().as_str(), "shift-3");
        assert!(fx.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_same_transaction_carries_history() {
        let fx = Fixture::new(ScriptedGateway::answering(&["Three.", "Bay 4."]));
        fx.put_part(0, "three trucks arrive at bay 4");
        let orchestrator = fx.orchestrator();

        let first = orchestrator
            .chat(ChatRequest::new(key(), "How many trucks?"))
            .await
            .unwrap();
        let second = orchestrator
            .chat(
                ChatRequest::new(key(), "Where did they park?")
                    .with_transaction_id(first.transaction_id.as_str()),
            )
            .await
            .unwrap();

        assert_eq!(second.transaction_id, first.transaction_id);
        let requests = fx.gateway.requests();
        assert!(requests[0].context.history.is_empty());

        let history: Vec<_> = requests[1]
            .context
            .history
            .iter()
            .map(|t| (t.role, t.text.as_str()))
            .collect();
        assert_eq!(
            history,
            vec![(Role::User, "How many trucks?"), (Role::Assistant, "Three.")]
        );
        assert_eq!(second.conversation.len(), 4);
    }

    #[tokio::test]
    async fn test_empty_listing_is_no_transcript() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));

        let failure = fx
            .orchestrator()
            .chat(ChatRequest::new(key(), "Anything?").with_transaction_id("shift-1"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::NoTranscriptAvailable);
        assert_eq!(failure.stage, ChatStage::Merging);
        assert_eq!(failure.transaction_id.unwrap().as_str(), "shift-1");
        assert!(fx.gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_missing_location_is_reported() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));
        fx.chunks.insert(Chunk::new(ChunkKey::new("wh1", "cam1", "bare"), None));

        let failure = fx
            .orchestrator()
            .chat(ChatRequest::new(ChunkKey::new("wh1", "cam1", "bare"), "Anything?"))
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::TranscriptLocationAbsent);
        assert_eq!(fx.objects.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_answer_distinct_from_service_error() {
        let fx = Fixture::new(ScriptedGateway::new(vec![
            Err(WarechatError::EmptyInferenceResponse("blank".into())),
            Err(WarechatError::InferenceService("503".into())),
        ]));
        fx.put_part(0, "quiet aisle");
        let orchestrator = fx.orchestrator();

        let empty = orchestrator
            .chat(ChatRequest::new(key(), "q1"))
            .await
            .unwrap_err();
        let service = orchestrator
            .chat(ChatRequest::new(key(), "q2"))
            .await
            .unwrap_err();

        assert_eq!(empty.kind(), ErrorKind::EmptyInferenceResponse);
        assert_eq!(service.kind(), ErrorKind::InferenceServiceError);
        assert_eq!(service.stage, ChatStage::Inferring);
        assert_ne!(empty.kind(), service.kind());
    }

    #[tokio::test]
    async fn test_recording_failure_keeps_answer() {
        let fx = Fixture::new(ScriptedGateway::answering(&["Yes."]))
            .with_conversations(Arc::new(BrokenConversationStore));
        fx.put_part(0, "door open");

        let reply = fx
            .orchestrator()
            .chat(ChatRequest::new(key(), "Is the door open?"))
            .await
            .unwrap();

        assert_eq!(reply.answer, "Yes.");
        assert!(!reply.recorded);
    }

    #[tokio::test]
    async fn test_caller_conversation_seeds_history() {
        let fx = Fixture::new(ScriptedGateway::answering(&["Two."]));
        fx.put_part(0, "two pallets");
        let store = Arc::new(MemoryConversationStore::new());
        let fx = fx.with_conversations(store.clone());

        let mut request = ChatRequest::new(key(), "And now?").with_transaction_id("t1");
        request.conversation = vec![Turn::user("Any pallets?"), Turn::assistant("Yes.")];

        fx.orchestrator().chat(request).await.unwrap();

        assert_eq!(fx.gateway.requests()[0].context.history.len(), 2);
        let stored = store
            .get_history(&ConversationKey::new(key(), TransactionId::parse("t1").unwrap()))
            .await
            .unwrap();
        assert_eq!(stored.len(), 4);
        assert_eq!(stored[0].text, "Any pallets?");
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_seed_once() {
        let fx = Fixture::new(ScriptedGateway::answering(&["Two.", "Three."]));
        fx.put_part(0, "pallets");
        let store = Arc::new(MemoryConversationStore::new());
        let fx = fx.with_conversations(store.clone());
        let orchestrator = Arc::new(fx.orchestrator());

        let seeded_request = |question: &str| {
            let mut request = ChatRequest::new(key(), question).with_transaction_id("t2");
            request.conversation = vec![Turn::user("Any pallets?"), Turn::assistant("Yes.")];
            request
        };

        let (first, second) = tokio::join!(
            orchestrator.chat(seeded_request("How many now?")),
            orchestrator.chat(seeded_request("And later?")),
        );
        assert!(first.unwrap().recorded);
        assert!(second.unwrap().recorded);

        let stored = store
            .get_history(&ConversationKey::new(key(), TransactionId::parse("t2").unwrap()))
            .await
            .unwrap();
        assert_eq!(stored.len(), 6);
        assert_eq!(stored.iter().filter(|t| t.text == "Any pallets?").count(), 1);
        assert_eq!(stored[0].text, "Any pallets?");
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_lookup() {
        let fx = Fixture::new(ScriptedGateway::answering(&["unused"]));
        let orchestrator = fx.orchestrator();

        let blank = orchestrator
            .chat(ChatRequest::new(key(), "   "))
            .await
            .unwrap_err();
        assert_eq!(blank.kind(), ErrorKind::InvalidInput);
        assert!(blank.transaction_id.is_some());

        let bad_id = orchestrator
            .chat(ChatRequest::new(key(), "q").with_transaction_id("not valid!"))
            .await
            .unwrap_err();
        assert_eq!(bad_id.kind(), ErrorKind::InvalidInput);
        assert!(bad_id.transaction_id.is_none());
        assert_eq!(fx.chunks.lookups(), 0);
    }

    #[test]
    fn test_stage_sequence() {
        let mut stage = ChatStage::Resolving;
        let mut seen = vec![stage];
        while stage != ChatStage::Done {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(seen[3], ChatStage::BuildingContext);
    }
}

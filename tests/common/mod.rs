//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the engine, the completion endpoint, the rebuild
//! step and the result store.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ragtune::domain::errors::{EngineError, LlmError, RebuildError, StoreError};
use ragtune::domain::models::{
    Category, EngineTuning, LoopHistory, PredictionResult, QaItem, RunResult,
};
use ragtune::domain::ports::{
    AskRequest, CompletionClient, CompletionRequest, EmbedSummary, Engine, EngineRebuilder,
    ResultStore,
};
use ragtune::normalize_answer;

type AnswerFn = dyn Fn(&AskRequest) -> String + Send + Sync;
type DelayFn = dyn Fn(&AskRequest) -> Duration + Send + Sync;
type FailWhenFn = dyn Fn(&EngineTuning) -> bool + Send + Sync;

/// Engine whose answers come from a closure over the request.
pub struct FakeEngine {
    answer: Box<AnswerFn>,
    pub calls: Mutex<Vec<String>>,
    pub asks: Mutex<Vec<AskRequest>>,
    fail_add_for: Mutex<Vec<String>>,
    panic_on_ask_for: Mutex<Vec<String>>,
    fail_embed: AtomicBool,
    delay: Box<DelayFn>,
}

impl FakeEngine {
    pub fn new(answer: impl Fn(&AskRequest) -> String + Send + Sync + 'static) -> Self {
        Self {
            answer: Box::new(answer),
            calls: Mutex::new(Vec::new()),
            asks: Mutex::new(Vec::new()),
            fail_add_for: Mutex::new(Vec::new()),
            panic_on_ask_for: Mutex::new(Vec::new()),
            fail_embed: AtomicBool::new(false),
            delay: Box::new(|_| Duration::ZERO),
        }
    }

    /// Answers every question with the same text.
    pub fn constant(text: &'static str) -> Self {
        Self::new(move |_| text.to_string())
    }

    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_for(move |_| delay)
    }

    /// Delays each answer by an amount chosen from the request.
    #[must_use]
    pub fn with_delay_for(mut self, delay: impl Fn(&AskRequest) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    /// Questions in the order their answers completed.
    pub fn completion_order(&self) -> Vec<String> {
        self.asks.lock().unwrap().iter().map(|r| r.question.clone()).collect()
    }

    pub fn fail_add_for(&self, project: &str) {
        self.fail_add_for.lock().unwrap().push(project.to_string());
    }

    /// Makes every `ask` against `project` panic.
    pub fn panic_on_ask_for(&self, project: &str) {
        self.panic_on_ask_for.lock().unwrap().push(project.to_string());
    }

    pub fn fail_embed(&self) {
        self.fail_embed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn ask(&self, request: &AskRequest) -> PredictionResult {
        let delay = (self.delay)(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.asks.lock().unwrap().push(request.clone());
        self.record(format!("ask {}", request.project));
        let crash = self.panic_on_ask_for.lock().unwrap().iter().any(|p| *p == request.project);
        if crash {
            panic!("engine crashed answering {:?}", request.question);
        }
        PredictionResult {
            text: (self.answer)(request),
            latency: delay,
            exit_status: Some(0),
        }
    }

    async fn add(&self, project: &str, category: Category, _content: &str, label: &str) -> Result<(), EngineError> {
        self.record(format!("add {project} {category} {label}"));
        if self.fail_add_for.lock().unwrap().iter().any(|p| p == project) {
            return Err(EngineError::NonZeroExit {
                command: "engram add".into(),
                status: Some(1),
                stderr: "disk full".into(),
            });
        }
        Ok(())
    }

    async fn embed(&self, project: &str) -> Result<EmbedSummary, EngineError> {
        self.record(format!("embed {project}"));
        if self.fail_embed.load(Ordering::SeqCst) {
            return Err(EngineError::Timeout {
                command: "engram embed".into(),
                timeout_secs: 300,
            });
        }
        Ok(EmbedSummary { total_chunks: Some(42) })
    }

    async fn build_graph(&self, project: &str) -> Result<(), EngineError> {
        self.record(format!("graph {project}"));
        Ok(())
    }

    async fn forget(&self, project: &str) -> Result<(), EngineError> {
        self.record(format!("forget {project}"));
        Ok(())
    }
}

/// Judge endpoint that says YES when the normalized answer equals the gold.
pub struct EqualityJudge {
    pub calls: AtomicUsize,
}

impl EqualityJudge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn field<'a>(prompt: &'a str, name: &str) -> &'a str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix(name))
        .unwrap_or_default()
        .trim()
}

#[async_trait]
impl CompletionClient for EqualityJudge {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gold = field(&request.prompt, "Gold:");
        let answer = field(&request.prompt, "Answer:");
        if normalize_answer(gold) == normalize_answer(answer) {
            Ok("YES".into())
        } else {
            Ok("NO".into())
        }
    }
}

/// Rebuilder that records activations and can be told to fail.
pub struct FakeRebuilder {
    pub active: Mutex<Option<EngineTuning>>,
    pub attempts: Mutex<Vec<EngineTuning>>,
    fail_when: Box<FailWhenFn>,
}

impl FakeRebuilder {
    pub fn new() -> Arc<Self> {
        Self::failing_when(|_| false)
    }

    pub fn failing() -> Arc<Self> {
        Self::failing_when(|_| true)
    }

    /// Fails every build whose tuning matches `fail_when`.
    pub fn failing_when(fail_when: impl Fn(&EngineTuning) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            fail_when: Box::new(fail_when),
        })
    }

    pub fn attempts(&self) -> Vec<EngineTuning> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn active(&self) -> Option<EngineTuning> {
        *self.active.lock().unwrap()
    }
}

#[async_trait]
impl EngineRebuilder for FakeRebuilder {
    async fn rebuild(&self, tuning: &EngineTuning) -> Result<(), RebuildError> {
        self.attempts.lock().unwrap().push(*tuning);
        if (self.fail_when)(tuning) {
            return Err(RebuildError::BuildFailed {
                status: Some(101),
                stderr: "error[E0308]: mismatched types".into(),
            });
        }
        *self.active.lock().unwrap() = Some(*tuning);
        Ok(())
    }

    async fn current(&self) -> Result<Option<EngineTuning>, RebuildError> {
        Ok(self.active())
    }
}

/// Store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    pub iterations: Mutex<Vec<(u32, RunResult)>>,
    pub histories: Mutex<Vec<LoopHistory>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn iteration_numbers(&self) -> Vec<u32> {
        self.iterations.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    pub fn last_history(&self) -> Option<LoopHistory> {
        self.histories.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_iteration(&self, iteration: u32, run: &RunResult) -> Result<PathBuf, StoreError> {
        self.iterations.lock().unwrap().push((iteration, run.clone()));
        Ok(PathBuf::from(format!("loop_iter_{iteration}.json")))
    }

    async fn save_history(&self, history: &LoopHistory) -> Result<PathBuf, StoreError> {
        self.histories.lock().unwrap().push(history.clone());
        Ok(PathBuf::from("loop_results.json"))
    }
}

/// A small gold set spread over a few categories.
pub fn gold_items() -> Vec<QaItem> {
    vec![
        QaItem::new("Which database was chosen?", "PostgreSQL", Category::Decisions),
        QaItem::new("What caused the outage?", "connection pool exhaustion", Category::Bugs),
        QaItem::new("Which queue is used?", "RabbitMQ", Category::Decisions),
        QaItem::new("How are releases tagged?", "semantic version tags", Category::Procedures),
    ]
}

/// Gold answer for a question in [`gold_items`].
pub fn gold_for(question: &str) -> String {
    gold_items()
        .into_iter()
        .find(|item| item.question == question)
        .map(|item| item.gold_answer)
        .unwrap_or_default()
}

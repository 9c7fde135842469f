#![allow(dead_code)]

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use docask::config::Config;
use docask::embedding::EmbeddingPort;
use docask::generation::GenerationPort;
use docask::models::{Document, DocumentType};
use docask::pipeline::Pipeline;
use docask::port::PortError;
use docask::session::Session;

pub const DIMS: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into
/// one of `DIMS` buckets. Texts sharing words end up close together.
pub struct FakeEmbedder {
    model: String,
    pub available: AtomicBool,
    pub embed_calls: AtomicUsize,
    /// Drop the last vector of every batch.
    pub short_batches: AtomicBool,
    /// Batches containing this word stall, then fail.
    pub slow_failure: Mutex<Option<String>>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::named("fake-bow")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            available: AtomicBool::new(true),
            embed_calls: AtomicUsize::new(0),
            short_batches: AtomicBool::new(false),
            slow_failure: Mutex::new(None),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        v[0] = 0.01;
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[1 + (h as usize) % (DIMS - 1)] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingPort for FakeEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn check_available(&self) -> Result<(), PortError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Unavailable("connection refused".to_string()))
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("connection refused".to_string()));
        }
        let marker = self.slow_failure.lock().unwrap().clone();
        if let Some(marker) = marker {
            if texts.iter().any(|t| t.contains(&marker)) {
                tokio::time::sleep(Duration::from_millis(300)).await;
                return Err(PortError::Unavailable("embedding server crashed".to_string()));
            }
        }
        let mut out: Vec<Vec<f32>> = texts.iter().map(|t| Self::vector(t)).collect();
        if self.short_batches.load(Ordering::SeqCst) {
            out.pop();
        }
        Ok(out)
    }
}

/// Records every prompt and answers with a fixed string.
pub struct FakeGenerator {
    pub prompts: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationPort for FakeGenerator {
    fn model_name(&self) -> &str {
        "fake-llm"
    }

    async fn generate(&self, prompt: &str) -> Result<String, PortError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("model not loaded".to_string()));
        }
        Ok("stub answer".to_string())
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub config: Config,
    pub embedder: Arc<FakeEmbedder>,
    pub generator: Arc<FakeGenerator>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_index_dir(tmp.path().join("index"));
        let embedder = Arc::new(FakeEmbedder::new());
        let generator = Arc::new(FakeGenerator::new());
        let pipeline = Pipeline::new(
            &config,
            Arc::new(Session::new(&config.index.dir)),
            embedder.clone(),
            generator.clone(),
        );
        Self {
            tmp,
            config,
            embedder,
            generator,
            pipeline,
        }
    }

    /// A second pipeline over the same index directory, as a new process would see it.
    pub async fn reopen(&self) -> Pipeline {
        self.reopen_with(self.embedder.clone()).await
    }

    /// Like [`Harness::reopen`], but with a different embedding backend.
    pub async fn reopen_with(&self, embedder: Arc<FakeEmbedder>) -> Pipeline {
        let session = Session::restore(&self.config.index.dir, embedder.model_name()).await;
        Pipeline::new(
            &self.config,
            Arc::new(session),
            embedder,
            self.generator.clone(),
        )
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn document(&self, name: &str, content: &str, doc_type: DocumentType) -> Document {
        Document::from_path(self.write(name, content), doc_type)
    }
}

/// About 3,000 characters of distinct sentences.
pub fn harbour_text() -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < 3000 {
        text.push_str(&format!(
            "Sentence {:03} describes the harbour, the ships and the tides. ",
            i
        ));
        i += 1;
    }
    text.truncate(3000);
    text
}

/// A CSV with one row per fruit; each row becomes its own chunk.
pub fn fruit_csv() -> String {
    let mut csv = String::from("fruit,colour,origin\n");
    for (fruit, colour, origin) in [
        ("apple", "red", "Kazakhstan"),
        ("banana", "yellow", "Papua New Guinea"),
        ("cherry", "dark red", "Anatolia"),
        ("grape", "purple", "Caucasus"),
        ("lemon", "yellow", "Assam"),
        ("mango", "orange", "South Asia"),
    ] {
        csv.push_str(&format!("{},{},{}\n", fruit, colour, origin));
    }
    csv
}

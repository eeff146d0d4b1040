//! Pipeline service coordinating staging, extraction, chunking, summarization, and packaging.

use super::aggregate::{aggregate, aggregate_sections};
use super::chunking::{ChunkBudget, chunk_units};
use super::types::{PipelineError, SummaryFragment, TextChunk};
use crate::{
    artifact::{ArtifactBuilder, OutputArtifact},
    extract::{DocumentFormat, ExtractedDocument, extract_file},
    metrics::{MetricsSnapshot, PipelineMetrics},
    staging::{StagedUpload, file_stem},
    summarization::{RetryPolicy, Summarizer, TextGenerator},
};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Explicit settings handed to the pipeline at construction time.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory receiving staged uploads. Must exist before the first request.
    pub upload_dir: PathBuf,
    /// Size budget per chunk.
    pub chunk_budget: ChunkBudget,
    /// Upper bound on generated tokens per call.
    pub max_output_tokens: u32,
    /// Sampling temperature for every call.
    pub temperature: f32,
    /// Retry behaviour for transient generation failures.
    pub retry: RetryPolicy,
    /// Chunks summarized at the same time.
    pub max_concurrency: usize,
    /// Emit one heading per chunk's source range when a document spans several chunks.
    pub section_headings: bool,
}

impl PipelineSettings {
    /// Settings with default budgets for the given upload directory.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            chunk_budget: ChunkBudget::Characters(12_000),
            max_output_tokens: 1024,
            temperature: 0.3,
            retry: RetryPolicy::default(),
            max_concurrency: 4,
            section_headings: true,
        }
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied file name; its extension selects the extractor.
    pub file_name: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Run the full extract → chunk → summarize → aggregate → package pipeline.
    async fn simplify(&self, upload: Upload) -> Result<OutputArtifact, PipelineError>;

    /// Extract the ordered text units of an upload without summarizing.
    async fn extract(&self, upload: Upload) -> Result<ExtractedDocument, PipelineError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Owns the generator, settings, and metrics for all requests.
///
/// Construct once near process start and share it through an `Arc`. Each request is independent;
/// the only shared mutable state is the atomic metrics registry.
pub struct SummaryPipeline {
    settings: PipelineSettings,
    summarizer: Summarizer,
    builder: ArtifactBuilder,
    metrics: Arc<PipelineMetrics>,
}

impl SummaryPipeline {
    /// Build a pipeline around the given text generator.
    pub fn new(settings: PipelineSettings, generator: Arc<dyn TextGenerator>) -> Self {
        let summarizer = Summarizer::new(
            generator,
            settings.max_output_tokens,
            settings.temperature,
            settings.retry,
        );
        Self {
            settings,
            summarizer,
            builder: ArtifactBuilder::new(),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Settings this pipeline was built with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    async fn run(&self, upload: Upload) -> Result<OutputArtifact, PipelineError> {
        let started = Instant::now();
        let document = self.stage_and_extract(&upload).await?;
        if document.is_blank() {
            return Err(PipelineError::EmptyDocument);
        }

        let chunks = chunk_units(&document.units, &self.settings.chunk_budget)?;
        if chunks.is_empty() {
            return Err(PipelineError::EmptyDocument);
        }
        tracing::debug!(
            file_name = %upload.file_name,
            chunks = chunks.len(),
            budget = self.settings.chunk_budget.limit(),
            "Document chunked"
        );

        let fragments = self.summarize_chunks(&chunks).await?;

        let stem = file_stem(&upload.file_name);
        let artifact = if self.settings.section_headings && chunks.len() > 1 {
            let sections = aggregate_sections(&chunks, fragments, document.format)?;
            self.builder.build_sections(&stem, &sections)?
        } else {
            let body = aggregate(&chunks, fragments)?;
            self.builder.build(&stem, &body)?
        };

        self.metrics.record_document(chunks.len() as u64);
        tracing::info!(
            file_name = %upload.file_name,
            format = %document.format,
            units = document.unit_count(),
            chunks = chunks.len(),
            output_bytes = artifact.bytes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Document summarized"
        );
        Ok(artifact)
    }

    /// Resolve the format, stage the upload, and extract it. The staged file is gone on return.
    async fn stage_and_extract(&self, upload: &Upload) -> Result<ExtractedDocument, PipelineError> {
        let format = DocumentFormat::from_file_name(&upload.file_name)?;
        tracing::info!(
            file_name = %upload.file_name,
            %format,
            bytes = upload.bytes.len(),
            "Processing upload"
        );

        let dir = &self.settings.upload_dir;
        let staged = StagedUpload::write(dir, &upload.file_name, &upload.bytes)
            .await
            .map_err(|source| PipelineError::Staging {
                dir: dir.clone(),
                source,
            })?;

        let path = staged.path().to_path_buf();
        let document = tokio::task::spawn_blocking(move || extract_file(format, &path))
            .await
            .map_err(|err| {
                PipelineError::InternalInvariantViolation(format!("extraction task failed: {err}"))
            })??;
        drop(staged);

        Ok(document)
    }

    async fn summarize_chunks(
        &self,
        chunks: &[TextChunk],
    ) -> Result<Vec<SummaryFragment>, PipelineError> {
        let pending = chunks.iter().cloned().map(|chunk| {
            let summarizer = self.summarizer.clone();
            async move { summarizer.summarize(&chunk).await }
        });

        // First failure drops the remaining in-flight calls.
        stream::iter(pending)
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .map_err(PipelineError::from)
            .try_collect()
            .await
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        if let Err(err) = &result {
            self.metrics.record_failure();
            if err.is_user_error() {
                tracing::info!(operation, error = %err, "Request rejected");
            } else {
                tracing::error!(operation, error = %err, "Request failed");
            }
        }
        result
    }
}

#[async_trait]
impl PipelineApi for SummaryPipeline {
    async fn simplify(&self, upload: Upload) -> Result<OutputArtifact, PipelineError> {
        let result = self.run(upload).await;
        self.observe("simplify", result)
    }

    async fn extract(&self, upload: Upload) -> Result<ExtractedDocument, PipelineError> {
        let result = self.stage_and_extract(&upload).await;
        self.observe("extract", result)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarization::GenerationError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the chunk body back in upper case and counts calls.
    struct EchoGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _max_output_tokens: u32,
            _temperature: f32,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = prompt.rsplit("\n\n").next().unwrap_or_default();
            Ok(body.to_uppercase())
        }
    }

    fn pipeline(dir: &std::path::Path, budget: usize) -> (SummaryPipeline, Arc<EchoGenerator>) {
        let generator = Arc::new(EchoGenerator {
            calls: AtomicUsize::new(0),
        });
        let mut settings = PipelineSettings::new(dir);
        settings.chunk_budget = ChunkBudget::Characters(budget);
        settings.retry.initial_backoff = Duration::from_millis(1);
        (SummaryPipeline::new(settings, generator.clone()), generator)
    }

    #[tokio::test]
    async fn unsupported_upload_never_touches_the_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, generator) = pipeline(dir.path(), 100);

        let error = pipeline
            .simplify(Upload {
                file_name: "notes.txt".into(),
                bytes: b"plain text".to_vec(),
            })
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::UnsupportedFormat(ref ext) if ext == ".txt"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.metrics_snapshot().requests_failed, 1);
    }

    #[tokio::test]
    async fn corrupt_document_is_an_extraction_failure_and_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, _) = pipeline(dir.path(), 100);

        let error = pipeline
            .simplify(Upload {
                file_name: "broken.pdf".into(),
                bytes: b"not a pdf".to_vec(),
            })
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::ExtractionFailed(_)));
        assert!(!error.is_user_error());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_upload_dir_is_a_staging_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        let (pipeline, generator) = pipeline(&missing, 100);

        let error = pipeline
            .extract(Upload {
                file_name: "deck.pdf".into(),
                bytes: b"%PDF-1.4".to_vec(),
            })
            .await
            .unwrap_err();

        assert!(matches!(error, PipelineError::Staging { ref dir, .. } if *dir == missing));
        assert!(!error.is_user_error());
        assert!(!missing.exists());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn summarize_chunks_preserves_sequence_order() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, generator) = pipeline(dir.path(), 100);
        let chunks = numbered_chunks(6);

        let mut fragments = pipeline.summarize_chunks(&chunks).await.unwrap();
        fragments.sort_by_key(|fragment| fragment.sequence);

        assert_eq!(generator.calls.load(Ordering::SeqCst), 6);
        assert_eq!(fragments[4].text, "CHUNK 4");
        let body = aggregate(&chunks, fragments).unwrap();
        assert!(body.starts_with("CHUNK 0\n\nCHUNK 1"));
    }

    fn numbered_chunks(count: usize) -> Vec<TextChunk> {
        (0..count)
            .map(|sequence| TextChunk {
                sequence,
                text: format!("chunk {sequence}"),
                source_units: (sequence + 1, sequence + 1),
                starts_mid_unit: false,
            })
            .collect()
    }

    /// Holds every call open briefly and records the highest number of overlapping calls.
    #[derive(Default)]
    struct InFlightGenerator {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for InFlightGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _max_output_tokens: u32,
            _temperature: f32,
        ) -> Result<String, GenerationError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("summary".into())
        }
    }

    #[tokio::test]
    async fn concurrent_calls_never_exceed_max_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(InFlightGenerator::default());
        let mut settings = PipelineSettings::new(dir.path());
        settings.max_concurrency = 2;
        let pipeline = SummaryPipeline::new(settings, generator.clone());

        let fragments = pipeline.summarize_chunks(&numbered_chunks(7)).await.unwrap();

        assert_eq!(fragments.len(), 7);
        assert_eq!(generator.peak.load(Ordering::SeqCst), 2);
        assert_eq!(generator.current.load(Ordering::SeqCst), 0);
    }

    /// Rejects the chunk containing "chunk 1" at once; every other call hangs far past the test.
    #[derive(Default)]
    struct FailFastGenerator {
        finished: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for FailFastGenerator {
        async fn generate(
            &self,
            prompt: &str,
            _max_output_tokens: u32,
            _temperature: f32,
        ) -> Result<String, GenerationError> {
            if prompt.ends_with("chunk 1") {
                return Err(GenerationError::Auth("invalid api key".into()));
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok("late summary".into())
        }
    }

    #[tokio::test]
    async fn fatal_error_abandons_outstanding_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(FailFastGenerator::default());
        let pipeline = SummaryPipeline::new(PipelineSettings::new(dir.path()), generator.clone());

        let error = tokio::time::timeout(
            Duration::from_secs(2),
            pipeline.summarize_chunks(&numbered_chunks(4)),
        )
        .await
        .expect("failure should not wait for slow chunks")
        .unwrap_err();

        assert!(matches!(error, PipelineError::SummarizationAuthError(_)));
        assert_eq!(generator.finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn default_settings_match_documented_defaults() {
        let settings = PipelineSettings::new("uploads");
        assert_eq!(settings.chunk_budget, ChunkBudget::Characters(12_000));
        assert_eq!(settings.max_concurrency, 4);
        assert!(settings.section_headings);
    }
}

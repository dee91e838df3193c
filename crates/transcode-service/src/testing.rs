//! In-process [`Transformer`] for tests and dry runs.
//!
//! Writes placeholder files instead of running ffmpeg. Can be told to fail
//! at a stage or to hold stage 2 until a permit is released.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_model::job::ConversionParams;
use tokio::sync::Semaphore;

use crate::transform::Transformer;

/// Placeholder artifact written by stage 2.
pub const FAKE_GIF: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GeneratePalette,
    ApplyPalette,
}

#[derive(Debug, Default)]
pub struct FakeTransformer {
    fail_at: Option<(Stage, String)>,
    gate: Option<Arc<Semaphore>>,
    seen: Mutex<Vec<ConversionParams>>,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: Stage, diagnostic: impl Into<String>) -> Self {
        Self {
            fail_at: Some((stage, diagnostic.into())),
            ..Self::default()
        }
    }

    /// Stage 2 waits for a permit on [`gate`](Self::gate).
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        self.gate
            .clone()
            .unwrap_or_else(|| Arc::new(Semaphore::new(0)))
    }

    /// Parameters of every palette stage run so far.
    pub fn seen_params(&self) -> Vec<ConversionParams> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn check(&self, stage: Stage) -> LoopcastResult<()> {
        match &self.fail_at {
            Some((failing, diagnostic)) if *failing == stage => {
                Err(LoopcastError::conversion(diagnostic.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn generate_palette(
        &self,
        _input: &Path,
        palette: &Path,
        params: &ConversionParams,
    ) -> LoopcastResult<()> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(*params);
        }
        tokio::fs::write(palette, b"palette").await?;
        self.check(Stage::GeneratePalette)
    }

    async fn apply_palette(
        &self,
        _input: &Path,
        _palette: &Path,
        output: &Path,
        _params: &ConversionParams,
    ) -> LoopcastResult<()> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| LoopcastError::conversion(e.to_string()))?
                .forget();
        }
        self.check(Stage::ApplyPalette)?;
        tokio::fs::write(output, FAKE_GIF).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

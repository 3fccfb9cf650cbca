//! Diagram collaborator plumbing.
//!
//! Diagram rendering is the only deferred concern in the pipeline. Fenced
//! `mermaid` blocks and `<mermaid>` widgets become placeholder containers
//! immediately; the actual rendering happens later, when the host drains the
//! pending queue. The engine itself is a black box loaded lazily and at most
//! once per process; every failure degrades to a static escaped code block.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use thiserror::Error;

use crate::dom;

/// Failures surfaced by a diagram engine. Never propagated to render
/// callers; they only select the fallback path.
#[derive(Debug, Error)]
pub enum DiagramError {
    /// The engine could not be loaded.
    #[error("diagram engine unavailable: {0}")]
    Load(String),
    /// A single diagram failed to render.
    #[error("diagram render failed: {0}")]
    Render(String),
}

/// Black-box diagram renderer supplied by the host.
pub trait DiagramEngine: Send + Sync {
    /// Renders diagram source into display markup for the given placeholder.
    fn render(&self, id: &str, source: &str) -> Result<String, DiagramError>;

    /// Builds placeholder container markup, when the engine provides one.
    /// The default engine-less container is used otherwise.
    fn container(&self, id: &str, source: &str) -> Option<String> {
        let _ = (id, source);
        None
    }
}

/// Loader closure invoked lazily, at most once per process.
pub type EngineLoader = Box<dyn Fn() -> Result<Arc<dyn DiagramEngine>, DiagramError> + Send + Sync>;

/// A deferred diagram update addressed to a placeholder element id.
///
/// The host swaps `html` into the element with `target_id`; an id that no
/// longer exists means the render was superseded and the update is dropped.
#[derive(Debug)]
pub struct DiagramUpdate {
    /// Placeholder element id.
    pub target_id: String,
    /// Replacement markup (rendered diagram or escaped fallback).
    pub html: String,
}

struct PendingRender {
    target_id: String,
    source: String,
}

/// Shared diagram state: the lazily loaded engine, the pending-render
/// queue, and the placeholder id counter.
pub struct DiagramHub {
    engine: OnceCell<Result<Arc<dyn DiagramEngine>, String>>,
    loader: Option<EngineLoader>,
    queue: Mutex<VecDeque<PendingRender>>,
    next_id: AtomicU64,
}

impl DiagramHub {
    /// A hub with no engine: placeholders still render, every deferred
    /// update degrades to the escaped fallback.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A hub that loads its engine on first use through `loader`.
    pub fn with_loader(loader: EngineLoader) -> Self {
        Self::build(Some(loader))
    }

    fn build(loader: Option<EngineLoader>) -> Self {
        Self {
            engine: OnceCell::new(),
            loader,
            queue: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh placeholder element id.
    pub fn next_placeholder_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("pet-diagram-{n}")
    }

    /// Queues a deferred render for the given placeholder.
    pub(crate) fn enqueue(&self, target_id: &str, source: &str) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(PendingRender {
                target_id: target_id.to_string(),
                source: source.to_string(),
            });
        }
    }

    /// Returns true when deferred renders are waiting.
    pub fn has_pending(&self) -> bool {
        self.queue.lock().map(|q| !q.is_empty()).unwrap_or(false)
    }

    /// The engine, triggering the one-time lazy load. Returns `None` when
    /// no loader was supplied or loading failed (the failure is memoized).
    pub fn engine(&self) -> Option<Arc<dyn DiagramEngine>> {
        let loader = self.loader.as_ref()?;
        let slot = self.engine.get_or_init(|| match loader() {
            Ok(engine) => Ok(engine),
            Err(err) => {
                log::warn!("diagram engine failed to load: {err}");
                Err(err.to_string())
            }
        });
        slot.as_ref().ok().cloned()
    }

    /// The engine only if a previous call already loaded it; never triggers
    /// a load.
    pub fn loaded_engine(&self) -> Option<Arc<dyn DiagramEngine>> {
        self.engine.get().and_then(|slot| slot.as_ref().ok().cloned())
    }

    /// Performs all queued renders, returning one update per placeholder.
    ///
    /// Loading happens here, once; a missing or failing engine turns each
    /// update into a static escaped code block. This call never fails.
    pub fn drain(&self) -> Vec<DiagramUpdate> {
        let pending: Vec<PendingRender> = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        if pending.is_empty() {
            return Vec::new();
        }

        let engine = self.engine();
        pending
            .into_iter()
            .map(|task| {
                let html = match &engine {
                    Some(engine) => engine
                        .render(&task.target_id, &task.source)
                        .unwrap_or_else(|err| {
                            log::warn!("diagram {} fell back to source: {err}", task.target_id);
                            fallback_code_block(&task.source)
                        }),
                    None => fallback_code_block(&task.source),
                };
                DiagramUpdate {
                    target_id: task.target_id,
                    html,
                }
            })
            .collect()
    }
}

impl Default for DiagramHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The static fallback shown when diagram rendering is unavailable.
pub(crate) fn fallback_code_block(source: &str) -> String {
    format!(
        "<pre><code class=\"language-mermaid\">{}</code></pre>",
        dom::escape_text(source)
    )
}

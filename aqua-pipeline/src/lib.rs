//! # aqua-pipeline
//!
//! The Aqua Forum photo pipeline: uploads come in, tags come out.
//! Gluing together `aqua-media` (where the bytes live), `aqua-queue`
//! (when the work runs) and `aqua-vision` (what the model sees), it
//! keeps the upload request path fast by pushing all LLM work behind a
//! durable job queue.
//!
//! ## Features
//!
//! - **Fast upload path**: store bytes, create a `pending` record,
//!   enqueue the tagging job, return
//! - **Photo records** with a `pending -> processing -> completed |
//!   failed` tagging state machine
//! - **Vision tagging worker** that merges model tags into the photo
//!   case-insensitively and idempotently
//! - **Tag usage index** counting distinct photo-tag associations,
//!   queryable by prefix for autocomplete
//! - **Terminal-failure notifier** guaranteeing every exhausted job
//!   leaves its photo `failed` with a non-empty error
//! - **Environment-driven configuration** with working local defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aqua_pipeline::{
//!     open_database, spawn_failure_notifier, PhotoStore, PipelineConfig, TagUsageIndex,
//!     VisionWorker,
//! };
//! use aqua_queue::QueueManager;
//! use aqua_vision::LlmTagger;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::from_env()?;
//!
//!     let db = open_database(config.forum_db.as_deref())?;
//!     let store = PhotoStore::new(db.clone());
//!     let index = TagUsageIndex::new(db);
//!
//!     let queue = QueueManager::new(config.queue)?;
//!     let events = queue.take_events();
//!     let tagger = LlmTagger::new(config.vision);
//!     let worker = VisionWorker::new(store.clone(), index, tagger, config.tag_options);
//!     let queue = queue.spawn(worker);
//!
//!     if let Some(events) = events {
//!         spawn_failure_notifier(store, events);
//!     }
//!     // hand `queue` and the stores to the web layer
//!     # let _ = queue;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod notifier;
pub mod photos;
pub mod tags;
pub mod uploader;
pub mod worker;

pub use config::PipelineConfig;
pub use db::open_database;
pub use error::PipelineError;
pub use notifier::spawn_failure_notifier;
pub use photos::{Category, NewPhoto, PhotoRecord, PhotoStore, TagStatus};
pub use tags::TagUsageIndex;
pub use uploader::{PhotoDeleteReport, PhotoUpload, PhotoUploader};
pub use worker::{photo_id_of_job, vision_job_id, VisionTagJob, VisionWorker};

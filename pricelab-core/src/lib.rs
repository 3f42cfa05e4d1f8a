//! PriceLab Core — vendor price-record ingestion.
//!
//! This crate holds everything between a vendor CSV file and the
//! price-history store:
//! - Record model with eagerly derived price ratios
//! - Record-level and table-level validation rules
//! - Streaming vs bulk strategy selection
//! - Ingestion engine with threshold flushing and per-run phase tracking
//! - Reinstatement best-flag revocation
//! - Store sinks (in-memory and partitioned Parquet) and read-side queries

pub mod batch;
pub mod context;
pub mod frame;
pub mod ingest;
pub mod phase;
pub mod query;
pub mod record;
pub mod reinstate;
pub mod store;
pub mod strategy;
pub mod validate;

pub use batch::{DateTickerIndex, IngestionBatch};
pub use context::{ConfigError, RunContext, RunKind};
pub use ingest::{FlushPath, IngestError, IngestSummary, IngestionEngine, RunStatus};
pub use phase::RunPhase;
pub use query::{PriceQuery, QueryView};
pub use record::{PriceRecord, RawPriceRow};
pub use store::{MemoryStore, ParquetStore, PriceStore, SinkError};
pub use strategy::{select_strategy, IngestStrategy};
pub use validate::{Rule, ValidationError};

pub mod activity;
pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod metrics;
pub mod mutation;
pub mod schema;
pub mod session;
pub mod store;
pub mod validation;
pub mod view;

pub use config::Config;
pub use document::{ActivitySample, Document, DocumentStatus, DocumentType, Reviewer};
pub use error::{DocboardError, Result};
pub use metrics::TrendCard;
pub use mutation::MutationOrchestrator;
pub use schema::TableSchema;
pub use store::RecordStore;
pub use view::ViewEngine;

//! Bulk work-item operations by handle.
//!
//! Ties the handle store, selection engine, retry policy and batch
//! executor together behind a single request/report API.

#![warn(missing_docs)]

pub mod template;
pub mod operation;
pub mod repository;
pub mod manager;

pub use template::{render, placeholders, KNOWN_FIELDS};
pub use operation::{BulkOperation, OperationPayload};
pub use repository::WorkItemRepository;
pub use manager::{BulkConfig, BulkError, BulkOperationManager, BulkReport, BulkRequest, BulkWarning};

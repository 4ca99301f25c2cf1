//! Request-scoped batching of queued work.
//!
//! ## Lifecycle
//!
//! ```text
//! begin()            scope opens (outermost options captured)
//!   ↓
//! dispatch / fire    interceptors buffer queueable items
//!   ↓
//! begin()/commit()   nested scopes only move the depth
//!   ↓
//! commit()           outermost scope closes → flush
//!   ↓
//! 0 items → nothing | 1 item → direct dispatch | N items → ProcessBatch per chunk
//! ```

pub mod buffer;
pub mod flush;
pub mod manager;
pub mod process_batch;

pub use buffer::{BufferedItem, ItemBuffer};
pub use flush::{FlushReport, plan_chunks};
pub use manager::BatchManager;
pub use process_batch::ProcessBatch;

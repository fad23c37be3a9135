//! Selection - Backend probing and the storage facade
//!
//! TigerStyle: Decide once, at first use, then stay put.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StorageFacade                           │
//! │       OnceCell<Binding>  ·  implements RecordStore           │
//! └─────────────────────────────┬───────────────────────────────┘
//!                               │ first call
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      BackendProber                           │
//! │  Candidate(Remote) → Candidate(Local) → FileStore (always)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod facade;
mod prober;

#[cfg(test)]
pub(crate) mod testing;

pub use facade::{FacadeState, StorageFacade, StoreStatus};
pub use prober::{BackendKind, BackendProber, Binding, Candidate, Connector};

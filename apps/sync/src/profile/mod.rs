// Profile reconciliation workflow.
// Implements: local draft state, the remote-store seam, and the save-time
// engine that converges each section's remote collection to local intent.
// All HTTP traffic goes through api::ApiClient — no direct reqwest here.

pub mod draft;
pub mod models;
pub mod reconcile;
pub mod report;
pub mod store;

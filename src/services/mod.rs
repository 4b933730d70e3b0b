//! Domain services behind the capture workflow and the analyze route.
//!
//! ARCHITECTURE
//! ============
//! Each service owns one external dependency (the hand landmark model, the
//! LLM, the analyze endpoint) so the workflow and route handlers only see
//! typed results.

pub mod analyze_client;
pub mod detection;
pub mod reading;

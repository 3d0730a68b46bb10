//! Integration tests for leadgraph-graph
//!
//! Uses wiremock to simulate the Facebook Graph API and verifies retry,
//! classification, reporting, permission validation and lead fan-out
//! end to end.

mod common;

mod test_client;
mod test_leads;
mod test_permissions;

//! Rust clients for the finance server. [HttpClient](finance::HttpClient) talks to a running
//! server, [TestClient](finance::TestClient) drives the same state in-process.
pub mod finance;

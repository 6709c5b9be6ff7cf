// radar-test-utils: shared test utilities for the TeamRadar suite.
//
// Provides a framed TCP mock client for integration testing of the server's
// greeting handshake, fan-out and query behaviors.

pub mod mock_client;

pub use mock_client::MockClient;

// sa-test-utils: Shared test utilities for the socketapi suite.
//
// Provides a mock WebSocket client speaking the frame protocol, for
// integration testing against an in-process server.

pub mod mock_ws_client;

pub use mock_ws_client::MockWsClient;

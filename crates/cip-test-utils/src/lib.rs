// cip-test-utils: A scripted CIP control processor for integration tests.

pub mod frames;
pub mod mock_processor;

pub use mock_processor::{MockProcessor, RegistrationReply};

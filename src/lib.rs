// Library surface for headless/integration tests and reuse.
// The binary only wires these together with a terminal.
pub mod app;
pub mod app_dirs;
pub mod bank;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod media;
pub mod modality;
pub mod monitor;
pub mod policy;
pub mod recording;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod store;
pub mod ui;
pub mod util;

pub use error::{ProctorError, Result};
pub use session::{AssessmentSession, SessionConfig, SessionObserver, SessionResult, SessionStatus};

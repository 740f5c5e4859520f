pub mod generation_session;

pub use generation_session::{GenerationSession, SessionState, StepOutcome};

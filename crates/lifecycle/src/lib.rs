//! Notification lifecycle: the transition table and the services that drive
//! notifications through it.

pub mod pipeline;
pub mod retry;
pub mod state_machine;
pub mod submission;

pub use pipeline::{SendOutcome, SendPipeline};
pub use retry::RetrySweep;
pub use state_machine::{NotificationStateMachine, Transition, TransitionOutcome};
pub use submission::{ApproveOutcome, NewNotification, Submitter};

//! Background maintenance workers (§4.G): decay, summarization, dreaming,
//! reflection, and the scheduler that sequences them per tenant.

mod decay;
mod dreaming;
mod reflection;
mod scheduler;
mod summarization;

pub use decay::{decay_factor, decayed_importance, DecayWorker};
pub use dreaming::DreamingWorker;
pub use reflection::{Outcome, ReflectionContext, ReflectionEngine, ReflectionOutcome};
pub use scheduler::{DreamingTarget, MaintenanceReport, MaintenanceScheduler, StepReport};
pub use summarization::{Sentiment, SessionSummary, SummarizationWorker};

pub mod classifier;
pub mod escalation_prober;
pub mod http_prober;

pub use classifier::{AmbiguousStatusSet, HttpOutcome, StatusClassifier};
pub use escalation_prober::{EscalationProber, PageRenderer};
pub use http_prober::{HttpProber, UrlProber};

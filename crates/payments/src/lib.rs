//! Payments domain module.
//!
//! Payment attempts, the provider-independent outcome vocabulary, and the
//! reconciliation decision that maps a reported outcome onto a
//! `(payment status, job status)` pair. Provider payloads are parsed into a
//! tagged union and verified here before anything reaches the decision.
//!
//! No IO: persistence and provider HTTP clients live in `jobboard-infra`.

pub mod event;
pub mod outcome;
pub mod payment;
pub mod signature;

pub use event::{
    AdminDecision, OutcomeReport, ProviderEvent, ReportSource, SslcommerzEvent, StripeCheckoutSession,
    StripeEvent,
};
pub use outcome::{Decision, ReportedOutcome, Transition, decide};
pub use payment::{Payment, PaymentProvider, PaymentStatus, TransactionId};
pub use signature::{SignatureError, SslcommerzSignatureVerifier, StripeSignatureVerifier};

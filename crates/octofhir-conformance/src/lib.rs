//! # octofhir-conformance
//!
//! Sequence execution engine for FHIR server conformance testing.
//!
//! A [`Sequence`] is an ordered list of [`TestStep`]s validating one area of
//! server behavior. The [`SequenceRunner`] executes the steps one at a time
//! against a shared [`ExecutionContext`], classifies what each step produced
//! into an [`Outcome`], and returns a [`SequenceReport`] with exactly one
//! [`StepReport`] per declared step.
//!
//! ## Outcomes
//!
//! Step bodies return [`Verdict`]: `Ok(())` is a pass, `Err(outcome)` stops
//! the body with `fail`, `skip`, `omit`, `wait` or `error`. Transport and
//! parsing errors convert into `error` through `?`; panics are caught by the
//! runner.
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_conformance::prelude::*;
//!
//! let sequence = Sequence::new("us-core-condition", "Condition")
//!     .with_step(
//!         SearchStep::new("Condition")
//!             .param(SearchParamDef::reference("patient", "subject").fixed("85"))
//!             .save_discovered()
//!             .into_step("search-patient", "Server returns Conditions for a patient"),
//!     )?
//!     .with_step(
//!         SearchStep::new("Condition")
//!             .param(SearchParamDef::reference("patient", "subject").fixed("85"))
//!             .param(SearchParamDef::token("category", "category").with_system())
//!             .into_step("search-category", "Server returns Conditions by category"),
//!     )?
//!     .with_step(ReadStep::new("Condition").into_step("read", "Server returns Condition by id"))?;
//!
//! let config = load_config(None)?;
//! let runner = SequenceRunner::from_config(config)?;
//! let report = runner.run(&sequence).await;
//! println!("{}", report.to_json()?);
//! ```

pub mod assertions;
pub mod capability;
pub mod client;
pub mod config;
pub mod context;
mod date;
pub mod document;
mod error;
pub mod http;
pub mod observability;
mod outcome;
pub mod read;
pub mod reference;
pub mod report;
pub mod runner;
pub mod scope;
pub mod search;
pub mod sequence;
pub mod step;

pub use capability::{CapabilityDescriptor, Interaction, ServerCapabilities, Unrestricted};
pub use client::ReqwestClient;
pub use config::HarnessConfig;
pub use context::ExecutionContext;
pub use error::{ConformanceError, ErrorCategory, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use outcome::{
    Outcome, StepStatus, Verdict, ensure, fail, omit, omit_if, skip, skip_if, wait,
};
pub use read::ReadStep;
pub use report::{SequenceReport, StepReport, Summary};
pub use runner::SequenceRunner;
pub use scope::StepScope;
pub use search::{ParamKind, SearchParamDef, SearchQuery, SearchStep, StatusFilter, ValueSource};
pub use sequence::Sequence;
pub use step::{StepBody, TestStep};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_conformance::prelude::*;
/// ```
pub mod prelude {
    pub use crate::assertions::{
        RejectionPolicy, expect_bundle_nonempty, expect_content_type, expect_json,
        expect_operation_outcome, expect_operation_outcome_on_4xx, expect_resource_type,
        expect_status, expect_status_with,
    };
    pub use crate::config::loader::load_config;
    pub use crate::context::keys;
    pub use crate::{
        CapabilityDescriptor, ConformanceError, ExecutionContext, HarnessConfig,
        HttpClient, HttpResponse, Interaction, Outcome, ReadStep, ReqwestClient, SearchParamDef,
        SearchStep, Sequence, SequenceReport, SequenceRunner, ServerCapabilities, StepBody,
        StepScope, StepStatus, TestStep, Unrestricted, Verdict, ensure, fail, omit, omit_if, skip,
        skip_if, wait,
    };
}

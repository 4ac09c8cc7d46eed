//! Ops-plan wizard: the fixed, linear sequence of selections a shift lead
//! walks through before the summary is rendered.
//!
//! People → place per person → workload % → goal % → days inactive →
//! comment → complete. The state type carries exactly the data collected so
//! far, and [`advance`] is the only way to move it forward.

pub mod menu;
pub mod state;
pub mod transition;

pub use menu::{Menu, MenuChoice, StepOptions, confirmation_for, menu_for, prompt_for, widget_id};
pub use state::{Assignment, CompletedPlan, Crew, Step, WizardState};
pub use transition::{IgnoreReason, Outcome, Transition, WizardEvent, advance};

//! Summary renderer — turns a finished wizard into the shift-plan message.
//!
//! Output is deterministic for a given session and render time, except for
//! the verb on each assignment line. Use [`render_with`] to pin the verb.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::options::{NOT_PROVIDED, find_by_value};
use crate::session::Session;
use crate::wizard::{CompletedPlan, WizardState};

/// Cosmetic verbs for "handles/covers" on assignment lines.
pub const VERBS: [&str; 4] = ["handles", "covers", "sorts out", "takes care of"];

/// Shown when the comment window closed without a reply.
pub const NO_COMMENT: &str = "No comment provided.";

const REMINDERS: [&str; 5] = [
    "- Use the car 🚗",
    "- Send routes 🗺️",
    "- Ensure good quality control (QC)",
    "- Prioritize superlows",
    "- If you receive a nivel issue, fix it within an hour.",
];

/// Inputs to rendering that do not come from the session.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
    /// Local time the summary is produced; picks the shift name and date.
    pub generated_at: NaiveDateTime,
    /// Printed under "Container Codes"; the section is skipped when empty.
    pub container_codes: &'a [String],
}

/// Draw one verb uniformly from [`VERBS`].
pub fn pick_verb<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    VERBS.choose(rng).copied().unwrap_or(VERBS[0])
}

/// Render a completed session. `None` if the wizard has not finished.
pub fn render<R: Rng + ?Sized>(
    session: &Session,
    ctx: &RenderContext<'_>,
    rng: &mut R,
) -> Option<String> {
    render_with(session, ctx, || pick_verb(rng))
}

/// Render with a caller-supplied verb source.
pub fn render_with(
    session: &Session,
    ctx: &RenderContext<'_>,
    pick_verb: impl FnMut() -> &'static str,
) -> Option<String> {
    match &session.state {
        WizardState::Complete(plan) => Some(render_plan(plan, session, ctx, pick_verb)),
        _ => None,
    }
}

fn render_plan(
    plan: &CompletedPlan,
    session: &Session,
    ctx: &RenderContext<'_>,
    mut pick_verb: impl FnMut() -> &'static str,
) -> String {
    let options = session.options();
    let mut lines: Vec<String> = Vec::new();

    lines.push("🦍🦍🛴🛴 *Shift Plan* 🛴🛴🦍🦍".to_string());
    lines.push(format!(
        "{} - {}",
        shift_name(ctx.generated_at.hour()),
        ctx.generated_at.format("%d.%m.%Y")
    ));
    lines.push(format!("*{}*", weekday_greeting(ctx.generated_at.weekday())));
    lines.push(String::new());
    lines.push(format!("Shift lead: {}", session.author_name));
    lines.push(String::new());

    lines.push("*Goal*".to_string());
    lines.push(format!("- Availability: {}%", plan.goal_percentage));
    lines.push(String::new());

    lines.push("🚦 *Team and areas*:".to_string());
    for assignment in &plan.crew.assignments {
        let who = match find_by_value(options.people, &assignment.person) {
            Some(person) if person.has_handle() => format!("{} ({})", person.label, person.handle),
            Some(person) => person.label.clone(),
            None => assignment.person.clone(),
        };
        lines.push(format!(
            "- {who} {} {}",
            pick_verb(),
            options.place_label(&assignment.place)
        ));
    }
    lines.push(String::new());

    // Derived figures are not clamped and may exceed 100.
    let clusters = plan.workload_percentage + 10;
    let redeployment = plan.workload_percentage + 15;
    lines.push("📊 *Operational Notes*:".to_string());
    lines.push(format!(
        "- Inactivity: 🔄 {}% inactive for {} days.",
        plan.workload_percentage, plan.days_inactive
    ));
    lines.push(format!("- Clusters: {clusters}% in clusters."));
    lines.push(format!("- Redeployment: 📉 {redeployment}% on inactives."));
    lines.push(String::new());

    if !ctx.container_codes.is_empty() {
        lines.push("🔒 *Container Codes*:".to_string());
        for (i, code) in ctx.container_codes.iter().enumerate() {
            lines.push(format!("- Code {}: {code}", i + 1));
        }
        lines.push(String::new());
    }

    lines.push("🚨 *Important Reminders*:".to_string());
    lines.extend(REMINDERS.iter().map(|r| r.to_string()));
    lines.push(String::new());

    lines.push("📞 *Contact*:".to_string());
    for person in &plan.crew.people {
        let (label, phone) = match find_by_value(options.people, person) {
            Some(p) => (p.label.as_str(), p.phone.as_str()),
            None => (person.as_str(), NOT_PROVIDED),
        };
        lines.push(format!("• {label}: {phone}"));
    }
    lines.push(String::new());

    lines.push("*Comment*:".to_string());
    lines.push(plan.comment.clone().unwrap_or_else(|| NO_COMMENT.to_string()));
    lines.push(String::new());

    lines.push("🪫🪫 *Battery Check* 🔋🔋".to_string());
    lines.push("Make sure you're charged up and ready to go!".to_string());

    lines.join("\n")
}

fn shift_name(hour: u32) -> &'static str {
    match hour {
        6..=13 => "🌅 Morning shift",
        14..=21 => "🌄 Evening shift",
        _ => "🌠 Night shift",
    }
}

fn weekday_greeting(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Finally Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "It's Wednesday my dudes",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday!",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

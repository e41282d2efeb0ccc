// Experiment workflow engine
// Every command validates against current state, works on a copy and only
// commits (with exactly one history entry) once everything has passed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::actor::Actor;
use super::clock::{Clock, SystemClock};
use super::errors::WorkflowError;
use super::events::{EventKind, WorkflowEvent};
use super::transitions::TransitionTable;
use crate::delivery::RecipeStatus;
use crate::experiment::history::{diff, snapshot};
use crate::experiment::sections::incomplete_required;
use crate::experiment::signoff::missing_sign_offs;
use crate::experiment::validation::{
    validate_branches, validate_name, validate_overview, validate_population,
    validate_recipe_ids, validate_risks, validate_timeline,
};
use crate::experiment::{
    slugify, Branch, ChangeLogEntry, Experiment, ExperimentKind, ExperimentSummary,
    ExperimentUpdate, FieldChange, FieldDiffs, SignOff, Status, UserId, ValidationErrors,
    ValidationRules,
};

/// Knobs the engine takes from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub transitions: TransitionTable,
    /// Statuses in which the archived flag may not be changed
    pub non_archivable: BTreeSet<Status>,
    pub validation: ValidationRules,
    pub delivery_slug_max_len: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            transitions: TransitionTable::default(),
            non_archivable: [Status::Live].into_iter().collect(),
            validation: ValidationRules::default(),
            delivery_slug_max_len: 80,
        }
    }
}

/// Result of a sign-off edit: the event (if anything changed) and the
/// changes dropped because the actor lacked permission
#[derive(Debug, Clone, PartialEq)]
pub struct SignOffOutcome {
    pub event: Option<WorkflowEvent>,
    pub denied: Vec<SignOff>,
}

pub struct WorkflowEngine {
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl WorkflowEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Start a new Draft experiment owned by the actor
    pub fn create(
        &self,
        name: &str,
        kind: ExperimentKind,
        actor: &Actor,
        existing: &[ExperimentSummary],
    ) -> Result<(Experiment, WorkflowEvent), WorkflowError> {
        let mut errors = ValidationErrors::new();
        validate_name(name, &mut errors);
        errors.into_result()?;

        let slug = slugify(name);
        if existing.iter().any(|e| e.slug == slug) {
            warn!(slug = %slug, "Rejected experiment creation: slug already in use");
            return Err(WorkflowError::DuplicateName {
                name: name.to_string(),
            });
        }

        let now = self.now();
        let mut experiment = Experiment::new(slug, name.trim(), kind, actor.user.clone(), now);
        let entry = self.record_creation(&mut experiment, &actor.user, now);
        info!(experiment = %experiment.slug, kind = %kind, owner = %actor.user, "Experiment created");
        let event = WorkflowEvent::new(&experiment, EventKind::Created, &actor.user, Some(&entry), now);
        Ok((experiment, event))
    }

    /// Move the experiment to `target`. Requesting the current status is a no-op.
    pub fn advance(
        &self,
        experiment: &mut Experiment,
        target: Status,
        actor: &Actor,
    ) -> Result<Option<WorkflowEvent>, WorkflowError> {
        let from = experiment.status;
        if from == target {
            return Ok(None);
        }

        if !self.settings.transitions.can_transition(from, target) {
            warn!(experiment = %experiment.slug, from = %from, to = %target, "Rejected status transition");
            return Err(WorkflowError::InvalidTransition { from, to: target });
        }

        if target == Status::Review {
            let sections = incomplete_required(experiment);
            if !sections.is_empty() {
                warn!(
                    experiment = %experiment.slug,
                    incomplete = sections.len(),
                    "Rejected move to Review: sections incomplete"
                );
                return Err(WorkflowError::SectionsIncomplete { sections });
            }
        }

        if from == Status::Review && target > Status::Review {
            let missing = missing_sign_offs(experiment);
            if !missing.is_empty() {
                warn!(
                    experiment = %experiment.slug,
                    missing = missing.len(),
                    "Rejected move out of Review: sign-offs missing"
                );
                return Err(WorkflowError::SignOffIncomplete { missing });
            }
        }

        let slug_max_len = self.settings.delivery_slug_max_len;
        let entry = self.commit(experiment, &actor.user, String::new(), |exp| {
            exp.status = target;
            if target == Status::Ship && exp.kind.uses_delivery() && exp.delivery.slug.is_none() {
                exp.delivery.slug = Some(delivery_slug(exp, slug_max_len));
            }
            Ok(())
        })?;

        info!(
            experiment = %experiment.slug,
            from_status = %from,
            to_status = %target,
            actor = %actor.user,
            "Experiment status transition"
        );
        Ok(entry.map(|entry| {
            self.event(experiment, EventKind::StatusChanged { from, to: target }, &actor.user, &entry)
        }))
    }

    /// Archive or unarchive. Setting the current value is a no-op.
    pub fn set_archived(
        &self,
        experiment: &mut Experiment,
        archived: bool,
        actor: &Actor,
    ) -> Result<Option<WorkflowEvent>, WorkflowError> {
        if experiment.archived == archived {
            return Ok(None);
        }
        if self.settings.non_archivable.contains(&experiment.status) {
            warn!(experiment = %experiment.slug, status = %experiment.status, "Rejected archive change");
            return Err(WorkflowError::NotArchivable {
                status: experiment.status,
            });
        }

        let message = if archived {
            "Archived Experiment"
        } else {
            "Unarchived Experiment"
        };
        let entry = self.commit(experiment, &actor.user, message.to_string(), |exp| {
            exp.archived = archived;
            Ok(())
        })?;

        info!(experiment = %experiment.slug, archived, actor = %actor.user, "{message}");
        let kind = if archived {
            EventKind::Archived
        } else {
            EventKind::Unarchived
        };
        Ok(entry.map(|entry| self.event(experiment, kind, &actor.user, &entry)))
    }

    /// Returns true if the user was not already subscribed. Not recorded in history.
    pub fn subscribe(&self, experiment: &mut Experiment, user: &UserId) -> bool {
        experiment.subscribers.insert(user.clone())
    }

    /// Returns true if the user was subscribed. Not recorded in history.
    pub fn unsubscribe(&self, experiment: &mut Experiment, user: &UserId) -> bool {
        experiment.subscribers.remove(user)
    }

    /// Copy the content of `source` into a new Draft experiment owned by the actor
    pub fn clone_experiment(
        &self,
        source: &Experiment,
        new_name: &str,
        actor: &Actor,
        existing: &[ExperimentSummary],
    ) -> Result<(Experiment, WorkflowEvent), WorkflowError> {
        let mut errors = ValidationErrors::new();
        validate_name(new_name, &mut errors);
        errors.into_result()?;

        let new_name = new_name.trim();
        let base_slug = slugify(new_name);
        let collides = existing.iter().any(|e| {
            !e.archived && (e.slug == base_slug || e.name.eq_ignore_ascii_case(new_name))
        });
        if collides {
            warn!(name = %new_name, source = %source.slug, "Rejected clone: name in use");
            return Err(WorkflowError::DuplicateName {
                name: new_name.to_string(),
            });
        }

        let slug = unique_slug(&base_slug, existing);
        let now = self.now();
        let mut experiment = Experiment::new(slug, new_name, source.kind, actor.user.clone(), now);
        experiment.content = source.content.clone();
        let entry = self.record_creation(&mut experiment, &actor.user, now);

        info!(
            experiment = %experiment.slug,
            source = %source.slug,
            owner = %actor.user,
            "Experiment cloned"
        );
        let event = WorkflowEvent::new(
            &experiment,
            EventKind::Cloned {
                source: source.slug.clone(),
            },
            &actor.user,
            Some(&entry),
            now,
        );
        Ok((experiment, event))
    }

    /// Append a history entry for an already-applied change. Never touches earlier entries.
    pub fn record_change<'a>(
        &self,
        experiment: &'a mut Experiment,
        actor: &UserId,
        changed_values: FieldDiffs,
        message: impl Into<String>,
    ) -> &'a ChangeLogEntry {
        let status = experiment.status;
        let previous = experiment.history.latest().map(|e| e.new_status).unwrap_or(status);
        experiment.history.append(
            actor.clone(),
            self.now(),
            Some(previous),
            status,
            message.into(),
            changed_values,
        )
    }

    /// Apply a per-section edit. An edit that changes nothing records nothing.
    pub fn update(
        &self,
        experiment: &mut Experiment,
        actor: &Actor,
        update: ExperimentUpdate,
        existing: &[ExperimentSummary],
    ) -> Result<Option<WorkflowEvent>, WorkflowError> {
        let rules = &self.settings.validation;
        let mut errors = ValidationErrors::new();
        match &update {
            ExperimentUpdate::Overview { name, overview, .. } => {
                validate_name(name, &mut errors);
                let taken = existing.iter().any(|e| {
                    e.slug != experiment.slug
                        && !e.archived
                        && (e.name.eq_ignore_ascii_case(name.trim()) || e.slug == slugify(name))
                });
                if taken {
                    errors.add("name", "This name is already in use.");
                }
                validate_overview(overview, rules, &mut errors);
            }
            ExperimentUpdate::TimelinePopulation {
                timeline,
                population,
            } => {
                validate_timeline(
                    timeline,
                    experiment.content.timeline.proposed_start_date,
                    self.now().date_naive(),
                    rules,
                    &mut errors,
                );
                validate_population(population, &mut errors);
            }
            ExperimentUpdate::RisksTesting { risks, .. } => validate_risks(risks, &mut errors),
            ExperimentUpdate::Design { .. }
            | ExperimentUpdate::Objectives { .. }
            | ExperimentUpdate::Results { .. } => {}
        }
        if !errors.is_empty() {
            warn!(
                experiment = %experiment.slug,
                section = update.section_name(),
                errors = %errors,
                "Rejected experiment edit"
            );
            return Err(WorkflowError::Validation(errors));
        }

        let section = update.section_name();
        let entry = self.commit(experiment, &actor.user, String::new(), move |exp| {
            if let ExperimentUpdate::Overview { name, owner, .. } = &update {
                exp.name = name.trim().to_string();
                if let Some(owner) = owner {
                    exp.owner = owner.clone();
                }
            }
            update.apply_content(&mut exp.content);
            Ok(())
        })?;

        if let Some(entry) = &entry {
            info!(
                experiment = %experiment.slug,
                section,
                fields = entry.changed_values.len(),
                actor = %actor.user,
                "Experiment edited"
            );
        }
        Ok(entry.map(|entry| self.event(experiment, EventKind::FieldsChanged, &actor.user, &entry)))
    }

    /// Replace the branch list. The ratio total is checked by section completeness, not here.
    pub fn set_branches(
        &self,
        experiment: &mut Experiment,
        actor: &Actor,
        branches: Vec<Branch>,
    ) -> Result<Option<WorkflowEvent>, WorkflowError> {
        let mut errors = ValidationErrors::new();
        validate_branches(&branches, experiment.kind, &mut errors);
        if !errors.is_empty() {
            warn!(experiment = %experiment.slug, errors = %errors, "Rejected branch edit");
            return Err(WorkflowError::Validation(errors));
        }

        let entry = self.commit(experiment, &actor.user, String::new(), |exp| {
            exp.content.branches = branches
                .into_iter()
                .map(|mut branch| {
                    branch.name = branch.name.trim().to_string();
                    if branch.slug.is_empty() {
                        branch.slug = slugify(&branch.name);
                    }
                    branch
                })
                .collect();
            Ok(())
        })?;
        Ok(entry.map(|entry| self.event(experiment, EventKind::FieldsChanged, &actor.user, &entry)))
    }

    /// Check or uncheck sign-offs. QA and release management sign-offs need the
    /// matching permission; changes without it are dropped and reported back.
    pub fn set_sign_offs(
        &self,
        experiment: &mut Experiment,
        actor: &Actor,
        changes: &BTreeMap<SignOff, bool>,
    ) -> Result<SignOffOutcome, WorkflowError> {
        if experiment.status == Status::Draft {
            warn!(experiment = %experiment.slug, "Rejected sign-off edit in Draft");
            return Err(WorkflowError::SignOffsLocked);
        }

        let mut denied = Vec::new();
        let mut added = Vec::new();
        let mut removed = Vec::new();
        for (&sign_off, &value) in changes {
            if experiment.sign_offs.contains(&sign_off) == value {
                continue;
            }
            if let Some(permission) = sign_off.required_permission() {
                if !actor.has_permission(permission) {
                    warn!(
                        experiment = %experiment.slug,
                        actor = %actor.user,
                        sign_off = %sign_off,
                        "Dropped sign-off change: missing permission"
                    );
                    denied.push(sign_off);
                    continue;
                }
            }
            if value {
                added.push(sign_off);
            } else {
                removed.push(sign_off);
            }
        }

        let entry = self.commit(experiment, &actor.user, sign_off_message(&added, &removed), |exp| {
            for sign_off in &added {
                exp.sign_offs.insert(*sign_off);
            }
            for sign_off in &removed {
                exp.sign_offs.remove(sign_off);
            }
            Ok(())
        })?;

        let event = entry.map(|entry| {
            info!(
                experiment = %experiment.slug,
                added = added.len(),
                removed = removed.len(),
                actor = %actor.user,
                "Sign-offs updated"
            );
            self.event(experiment, EventKind::SignOffsChanged, &actor.user, &entry)
        });
        Ok(SignOffOutcome { event, denied })
    }

    /// Annotate the experiment with the recipe ids handed out by the delivery system
    pub fn record_delivery(
        &self,
        experiment: &mut Experiment,
        actor: &Actor,
        primary: u64,
        others: Vec<u64>,
    ) -> Result<Option<WorkflowEvent>, WorkflowError> {
        if !experiment.kind.uses_delivery() {
            return Err(WorkflowError::DeliveryNotUsed {
                kind: experiment.kind,
            });
        }
        if experiment.status < Status::Review {
            return Err(WorkflowError::ExportUnavailable {
                status: experiment.status,
            });
        }
        let mut errors = ValidationErrors::new();
        validate_recipe_ids(primary, &others, &mut errors);
        errors.into_result()?;

        let entry = self.commit(experiment, &actor.user, String::new(), |exp| {
            exp.delivery.recipe_id = Some(primary);
            exp.delivery.other_recipe_ids = others;
            Ok(())
        })?;
        if entry.is_some() {
            info!(experiment = %experiment.slug, recipe_id = primary, "Recipe ids recorded");
        }
        Ok(entry.map(|entry| self.event(experiment, EventKind::DeliveryRecorded, &actor.user, &entry)))
    }

    /// Bring status in line with what the delivery system reports.
    /// Ship+approved -> Accepted, Accepted+enabled -> Live, Live+disabled -> Complete.
    pub fn reconcile_delivery(
        &self,
        experiment: &mut Experiment,
        recipe: &RecipeStatus,
        actor: &Actor,
    ) -> Result<Vec<WorkflowEvent>, WorkflowError> {
        let mut events = Vec::new();

        if experiment.delivery.enrollment_paused != recipe.enrollment_paused {
            let message = if recipe.enrollment_paused {
                "Enrollment paused"
            } else {
                "Enrollment resumed"
            };
            let entry = self.commit(experiment, &actor.user, message.to_string(), |exp| {
                exp.delivery.enrollment_paused = recipe.enrollment_paused;
                Ok(())
            })?;
            if let Some(entry) = entry {
                events.push(self.event(experiment, EventKind::DeliveryRecorded, &actor.user, &entry));
            }
        }

        loop {
            let target = match experiment.status {
                Status::Ship if recipe.approved => Status::Accepted,
                Status::Accepted if recipe.enabled => Status::Live,
                Status::Live if !recipe.enabled => Status::Complete,
                _ => break,
            };
            // The user who enabled the recipe is credited with launching it
            let launcher = match (&recipe.enabled_by, target) {
                (Some(user), Status::Live) => Actor {
                    user: user.clone(),
                    permissions: actor.permissions.clone(),
                },
                _ => actor.clone(),
            };
            match self.advance(experiment, target, &launcher)? {
                Some(event) => events.push(event),
                None => break,
            }
        }
        Ok(events)
    }

    fn record_creation(
        &self,
        experiment: &mut Experiment,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> ChangeLogEntry {
        let mut changed_values = FieldDiffs::new();
        let fields = snapshot(experiment);
        for field in ["name", "type", "owner", "variants"] {
            if let Some(value) = fields.get(field) {
                changed_values.insert(
                    field.to_string(),
                    FieldChange {
                        old_value: None,
                        new_value: Some(value.clone()),
                        display_name: crate::experiment::history::display_name(field),
                    },
                );
            }
        }
        experiment
            .history
            .append(actor.clone(), now, None, experiment.status, String::new(), changed_values)
            .clone()
    }

    /// Run `mutate` on a copy, diff it against the original and commit with one
    /// history entry. Nothing is committed if `mutate` fails or nothing changed.
    fn commit<F>(
        &self,
        experiment: &mut Experiment,
        actor: &UserId,
        message: String,
        mutate: F,
    ) -> Result<Option<ChangeLogEntry>, WorkflowError>
    where
        F: FnOnce(&mut Experiment) -> Result<(), WorkflowError>,
    {
        let before = snapshot(experiment);
        let old_status = experiment.status;
        let mut working = experiment.clone();
        mutate(&mut working)?;

        let changes = diff(&before, &snapshot(&working));
        if changes.is_empty() && working.status == old_status {
            return Ok(None);
        }
        let entry = working
            .history
            .append(
                actor.clone(),
                self.now(),
                Some(old_status),
                working.status,
                message,
                changes,
            )
            .clone();
        *experiment = working;
        Ok(Some(entry))
    }

    fn event(
        &self,
        experiment: &Experiment,
        kind: EventKind,
        actor: &UserId,
        entry: &ChangeLogEntry,
    ) -> WorkflowEvent {
        WorkflowEvent::new(experiment, kind, actor, Some(entry), entry.changed_on)
    }
}

fn sign_off_message(added: &[SignOff], removed: &[SignOff]) -> String {
    let labels = |items: &[SignOff]| {
        items
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut message = String::new();
    if !added.is_empty() {
        message.push_str(&format!("Added sign-offs: {} ", labels(added)));
    }
    if !removed.is_empty() {
        message.push_str(&format!("Removed sign-offs: {} ", labels(removed)));
    }
    message.trim_end().to_string()
}

/// `{kind}-{slug}-{channel}-{min}-{max}`, lowercased and cut to `max_len`
pub fn delivery_slug(experiment: &Experiment, max_len: usize) -> String {
    let population = &experiment.content.population;
    let mut parts = vec![experiment.kind.as_str().to_string(), experiment.slug.clone()];
    if let Some(channel) = population.channel {
        parts.push(channel.as_str().to_lowercase());
    }
    if let Some(min) = &population.min_version {
        parts.push(min.to_string());
    }
    if let Some(max) = &population.max_version {
        parts.push(max.to_string());
    }
    let mut slug = parts.join("-").to_lowercase();
    if slug.len() > max_len {
        let mut cut = max_len;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
    }
    slug.trim_end_matches('-').to_string()
}

/// `base`, or `base-2`, `base-3`, ... when the slug is already taken (archived experiments included)
fn unique_slug(base: &str, existing: &[ExperimentSummary]) -> String {
    let taken = |slug: &str| existing.iter().any(|e| e.slug == slug);
    if !taken(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{Channel, FirefoxVersion, Permission};
    use crate::workflows::clock::FixedClock;
    use chrono::TimeZone;

    fn engine() -> WorkflowEngine {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        WorkflowEngine::default().with_clock(Arc::new(FixedClock(now)))
    }

    fn owner() -> Actor {
        Actor::new("owner@example.com")
    }

    fn draft(engine: &WorkflowEngine) -> Experiment {
        engine
            .create("Bigger Button", ExperimentKind::Generic, &owner(), &[])
            .unwrap()
            .0
    }

    #[test]
    fn test_create_records_single_entry() {
        let engine = engine();
        let (exp, event) = engine
            .create("Bigger Button", ExperimentKind::Pref, &owner(), &[])
            .unwrap();
        assert_eq!(exp.slug, "bigger-button");
        assert_eq!(exp.history.len(), 1);
        let entry = exp.history.latest().unwrap();
        assert_eq!(entry.old_status, None);
        assert_eq!(entry.new_status, Status::Draft);
        assert!(entry.changed_values.contains_key("name"));
        assert_eq!(event.kind, EventKind::Created);
    }

    #[test]
    fn test_create_rejects_taken_slug_and_punctuation_names() {
        let engine = engine();
        let exp = draft(&engine);
        let err = engine
            .create("bigger button!", ExperimentKind::Pref, &owner(), &[exp.summary()])
            .unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateName { .. }));

        let err = engine
            .create("!!!", ExperimentKind::Pref, &owner(), &[])
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn test_advance_to_same_status_is_noop() {
        let engine = engine();
        let mut exp = draft(&engine);
        assert!(engine.advance(&mut exp, Status::Draft, &owner()).unwrap().is_none());
        assert_eq!(exp.history.len(), 1);
    }

    #[test]
    fn test_advance_rejects_unlisted_transition() {
        let engine = engine();
        let mut exp = draft(&engine);
        let before = exp.clone();
        let err = engine.advance(&mut exp, Status::Live, &owner()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: Status::Draft,
                to: Status::Live
            }
        ));
        assert_eq!(exp, before);
    }

    #[test]
    fn test_advance_to_review_requires_complete_sections() {
        let engine = engine();
        let mut exp = draft(&engine);
        let err = engine.advance(&mut exp, Status::Review, &owner()).unwrap_err();
        match err {
            WorkflowError::SectionsIncomplete { sections } => {
                assert!(sections.iter().any(|s| s.section.as_str() == "overview"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(exp.status, Status::Draft);
    }

    #[test]
    fn test_sign_offs_locked_in_draft() {
        let engine = engine();
        let mut exp = draft(&engine);
        let changes = BTreeMap::from([(SignOff::Legal, true)]);
        let err = engine.set_sign_offs(&mut exp, &owner(), &changes).unwrap_err();
        assert!(matches!(err, WorkflowError::SignOffsLocked));
    }

    #[test]
    fn test_sign_off_permissions_and_message() {
        let engine = engine();
        let mut exp = draft(&engine);
        exp.status = Status::Review;
        let changes = BTreeMap::from([
            (SignOff::Science, true),
            (SignOff::Legal, true),
            (SignOff::Qa, true),
        ]);
        let outcome = engine.set_sign_offs(&mut exp, &owner(), &changes).unwrap();
        assert_eq!(outcome.denied, vec![SignOff::Qa]);
        assert!(!exp.sign_offs.contains(&SignOff::Qa));
        let entry = exp.history.latest().unwrap();
        assert_eq!(
            entry.message,
            "Added sign-offs: Data Science Peer Review, Legal Review"
        );

        let qa = owner().with_permission(Permission::QaSignOff);
        let outcome = engine
            .set_sign_offs(&mut exp, &qa, &BTreeMap::from([(SignOff::Qa, true), (SignOff::Legal, false)]))
            .unwrap();
        assert!(outcome.denied.is_empty());
        assert!(exp.sign_offs.contains(&SignOff::Qa));
        assert_eq!(
            exp.history.latest().unwrap().message,
            "Added sign-offs: QA Sign-Off Removed sign-offs: Legal Review"
        );
    }

    #[test]
    fn test_archive_rules() {
        let engine = engine();
        let mut exp = draft(&engine);
        let event = engine.set_archived(&mut exp, true, &owner()).unwrap().unwrap();
        assert_eq!(event.kind, EventKind::Archived);
        assert_eq!(exp.history.latest().unwrap().message, "Archived Experiment");
        assert!(engine.set_archived(&mut exp, true, &owner()).unwrap().is_none());

        exp.status = Status::Live;
        let err = engine.set_archived(&mut exp, false, &owner()).unwrap_err();
        assert!(matches!(err, WorkflowError::NotArchivable { status: Status::Live }));
    }

    #[test]
    fn test_subscriptions_do_not_touch_history() {
        let engine = engine();
        let mut exp = draft(&engine);
        let user = UserId::new("watcher@example.com");
        assert!(engine.subscribe(&mut exp, &user));
        assert!(!engine.subscribe(&mut exp, &user));
        assert!(engine.unsubscribe(&mut exp, &user));
        assert!(!engine.unsubscribe(&mut exp, &user));
        assert_eq!(exp.history.len(), 1);
    }

    #[test]
    fn test_clone_suffixes_slug_of_archived_experiment() {
        let engine = engine();
        let mut source = draft(&engine);
        source.archived = true;
        let (copy, event) = engine
            .clone_experiment(&source, "Bigger Button", &Actor::new("other@example.com"), &[source.summary()])
            .unwrap();
        assert_eq!(copy.slug, "bigger-button-2");
        assert_eq!(copy.owner, UserId::new("other@example.com"));
        assert_eq!(
            event.kind,
            EventKind::Cloned {
                source: "bigger-button".to_string()
            }
        );
    }

    #[test]
    fn test_update_without_changes_records_nothing() {
        let engine = engine();
        let mut exp = draft(&engine);
        let update = ExperimentUpdate::Results {
            results: Default::default(),
        };
        assert!(engine.update(&mut exp, &owner(), update, &[]).unwrap().is_none());
        assert_eq!(exp.history.len(), 1);
    }

    #[test]
    fn test_record_delivery_requires_review() {
        let engine = engine();
        let mut exp = draft(&engine);
        exp.kind = ExperimentKind::Pref;
        let err = engine.record_delivery(&mut exp, &owner(), 10, vec![]).unwrap_err();
        assert!(matches!(err, WorkflowError::ExportUnavailable { status: Status::Draft }));

        exp.status = Status::Ship;
        let err = engine.record_delivery(&mut exp, &owner(), 10, vec![10]).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert!(engine.record_delivery(&mut exp, &owner(), 10, vec![11]).unwrap().is_some());
        assert_eq!(exp.delivery.recipe_id, Some(10));
        assert_eq!(exp.status, Status::Ship);
    }

    #[test]
    fn test_generic_experiments_skip_delivery() {
        let engine = engine();
        let mut exp = draft(&engine);
        exp.status = Status::Review;
        exp.sign_offs = SignOff::ALL.into_iter().collect();

        engine.advance(&mut exp, Status::Ship, &owner()).unwrap();
        assert_eq!(exp.status, Status::Ship);
        assert_eq!(exp.delivery.slug, None);

        let before = exp.clone();
        let err = engine.record_delivery(&mut exp, &owner(), 10, vec![]).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::DeliveryNotUsed {
                kind: ExperimentKind::Generic
            }
        ));
        assert_eq!(exp, before);
    }

    #[test]
    fn test_delivery_slug_format_and_truncation() {
        let engine = engine();
        let mut exp = draft(&engine);
        exp.kind = ExperimentKind::Pref;
        exp.content.population.channel = Some(Channel::Nightly);
        exp.content.population.min_version = Some(FirefoxVersion::new("60.0"));
        exp.content.population.max_version = Some(FirefoxVersion::new("62.0"));
        assert_eq!(delivery_slug(&exp, 80), "pref-bigger-button-nightly-60.0-62.0");
        assert_eq!(delivery_slug(&exp, 19), "pref-bigger-button");
    }

    #[test]
    fn test_record_change_appends_without_touching_past_entries() {
        let engine = engine();
        let mut exp = draft(&engine);
        let first = exp.history.clone();
        let entry = engine.record_change(&mut exp, &owner().user, FieldDiffs::new(), "Manual note");
        assert_eq!(entry.id, 2);
        assert!(first.is_extended_by(&exp.history));
    }
}

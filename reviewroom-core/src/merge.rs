//! Id-keyed shallow merge for partial snapshot updates.
//!
//! Incoming deltas carry `Option` fields: present fields overwrite, absent
//! fields are retained on the existing copy. Review and team lists merge by
//! `id` - matched entries are shallow-merged, unmatched incoming entries are
//! appended, and existing entries are never silently dropped.

use crate::review::{Review, ReviewSnapshot, ReviewStatus, Team};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Partial update to a team, keyed by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamPatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks_submitted: Option<bool>,
}

impl TeamPatch {
    /// Combine two patches for the same team; later fields win.
    fn merge(self, later: TeamPatch) -> TeamPatch {
        TeamPatch {
            id: self.id,
            name: later.name.or(self.name),
            members: later.members.or(self.members),
            marks: later.marks.or(self.marks),
            marks_submitted: later.marks_submitted.or(self.marks_submitted),
        }
    }

    /// Materialize a patch with no existing counterpart into a new team.
    fn into_team(self) -> Team {
        Team {
            id: self.id,
            name: self.name.unwrap_or_default(),
            members: self.members.unwrap_or_default(),
            marks: self.marks,
            marks_submitted: self.marks_submitted.unwrap_or(false),
        }
    }
}

impl Team {
    /// Shallow-merge a patch: present fields overwrite, absent retained.
    pub fn apply(&mut self, patch: TeamPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(members) = patch.members {
            self.members = members;
        }
        if let Some(marks) = patch.marks {
            self.marks = Some(marks);
        }
        if let Some(marks_submitted) = patch.marks_submitted {
            self.marks_submitted = marks_submitted;
        }
    }
}

/// Partial update to a review, keyed by `id`.
///
/// `teams` is itself an id-keyed merge, not a replacement: fields present
/// only on the existing teams survive a patch that touches other teams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewPatch {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReviewStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<TeamPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks_locked: Option<bool>,
}

impl ReviewPatch {
    /// Combine two patches for the same review; later fields win and team
    /// patches are merged id-keyed in arrival order.
    fn merge(self, later: ReviewPatch) -> ReviewPatch {
        let teams = match (self.teams, later.teams) {
            (Some(first), Some(second)) => Some(merge_team_patches(first, second)),
            (first, second) => second.or(first),
        };
        ReviewPatch {
            id: self.id,
            title: later.title.or(self.title),
            review_type: later.review_type.or(self.review_type),
            status: later.status.or(self.status),
            venue: later.venue.or(self.venue),
            scheduled_at: later.scheduled_at.or(self.scheduled_at),
            deadline_at: later.deadline_at.or(self.deadline_at),
            guide: later.guide.or(self.guide),
            panel: later.panel.or(self.panel),
            teams,
            marks_locked: later.marks_locked.or(self.marks_locked),
        }
    }

    /// Materialize a patch with no existing counterpart into a new review.
    fn into_review(self) -> Review {
        Review {
            id: self.id,
            title: self.title.unwrap_or_default(),
            review_type: self.review_type.unwrap_or_default(),
            status: self.status.unwrap_or(ReviewStatus::Scheduled),
            venue: self.venue,
            scheduled_at: self.scheduled_at,
            deadline_at: self.deadline_at,
            guide: self.guide,
            panel: self.panel.unwrap_or_default(),
            teams: self
                .teams
                .unwrap_or_default()
                .into_iter()
                .map(TeamPatch::into_team)
                .collect(),
            marks_locked: self.marks_locked.unwrap_or(false),
        }
    }
}

impl Review {
    /// Shallow-merge a patch: present fields overwrite, absent retained.
    pub fn apply(&mut self, patch: ReviewPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(review_type) = patch.review_type {
            self.review_type = review_type;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(venue) = patch.venue {
            self.venue = Some(venue);
        }
        if let Some(scheduled_at) = patch.scheduled_at {
            self.scheduled_at = Some(scheduled_at);
        }
        if let Some(deadline_at) = patch.deadline_at {
            self.deadline_at = Some(deadline_at);
        }
        if let Some(guide) = patch.guide {
            self.guide = Some(guide);
        }
        if let Some(panel) = patch.panel {
            self.panel = panel;
        }
        if let Some(team_patches) = patch.teams {
            merge_teams(&mut self.teams, team_patches);
        }
        if let Some(marks_locked) = patch.marks_locked {
            self.marks_locked = marks_locked;
        }
    }
}

fn merge_teams(existing: &mut Vec<Team>, patches: Vec<TeamPatch>) {
    for patch in patches {
        match existing.iter_mut().find(|t| t.id == patch.id) {
            Some(team) => team.apply(patch),
            None => existing.push(patch.into_team()),
        }
    }
}

fn merge_reviews(existing: &mut Vec<Review>, patches: Vec<ReviewPatch>) {
    for patch in patches {
        match existing.iter_mut().find(|r| r.id == patch.id) {
            Some(review) => review.apply(patch),
            None => existing.push(patch.into_review()),
        }
    }
}

fn merge_patch_lists(first: Vec<ReviewPatch>, second: Vec<ReviewPatch>) -> Vec<ReviewPatch> {
    let mut merged = first;
    for patch in second {
        match merged.iter().position(|p| p.id == patch.id) {
            Some(index) => {
                let prior = merged.remove(index);
                merged.insert(index, prior.merge(patch));
            }
            None => merged.push(patch),
        }
    }
    merged
}

fn merge_team_patches(first: Vec<TeamPatch>, second: Vec<TeamPatch>) -> Vec<TeamPatch> {
    let mut merged = first;
    for patch in second {
        match merged.iter().position(|p| p.id == patch.id) {
            Some(index) => {
                let prior = merged.remove(index);
                merged.insert(index, prior.merge(patch));
            }
            None => merged.push(patch),
        }
    }
    merged
}

/// Partial update to a snapshot: any subset of its fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<Vec<ReviewPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_passed: Option<Vec<ReviewPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past: Option<Vec<ReviewPatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<JsonValue>,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        self.active.is_none()
            && self.deadline_passed.is_none()
            && self.past.is_none()
            && self.statistics.is_none()
    }

    /// Combine two deltas in arrival order; later fields win per key and
    /// review lists combine id-keyed.
    pub fn merge(self, later: SnapshotDelta) -> SnapshotDelta {
        SnapshotDelta {
            active: merge_delta_lists(self.active, later.active),
            deadline_passed: merge_delta_lists(self.deadline_passed, later.deadline_passed),
            past: merge_delta_lists(self.past, later.past),
            statistics: later.statistics.or(self.statistics),
        }
    }
}

fn merge_delta_lists(
    first: Option<Vec<ReviewPatch>>,
    second: Option<Vec<ReviewPatch>>,
) -> Option<Vec<ReviewPatch>> {
    match (first, second) {
        (Some(first), Some(second)) => Some(merge_patch_lists(first, second)),
        (first, second) => second.or(first),
    }
}

impl ReviewSnapshot {
    /// Merge a delta into this snapshot.
    pub fn apply_delta(&mut self, delta: SnapshotDelta) {
        if let Some(patches) = delta.active {
            merge_reviews(&mut self.active, patches);
        }
        if let Some(patches) = delta.deadline_passed {
            merge_reviews(&mut self.deadline_passed, patches);
        }
        if let Some(patches) = delta.past {
            merge_reviews(&mut self.past, patches);
        }
        if let Some(statistics) = delta.statistics {
            self.statistics = Some(statistics);
        }
    }
}

/// An inbound update: either a full replacement snapshot or a partial delta.
///
/// Pull results and push snapshots replace the visible state wholesale;
/// push deltas merge into it. Both travel the same coalescing path so the
/// merge invariants stay uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotUpdate {
    Full(ReviewSnapshot),
    Partial(SnapshotDelta),
}

impl SnapshotUpdate {
    /// Combine two queued updates in arrival order. A later full snapshot
    /// supersedes everything before it; a later delta folds into whatever
    /// precedes it.
    pub fn merge(self, later: SnapshotUpdate) -> SnapshotUpdate {
        match (self, later) {
            (_, SnapshotUpdate::Full(snapshot)) => SnapshotUpdate::Full(snapshot),
            (SnapshotUpdate::Full(mut snapshot), SnapshotUpdate::Partial(delta)) => {
                snapshot.apply_delta(delta);
                SnapshotUpdate::Full(snapshot)
            }
            (SnapshotUpdate::Partial(first), SnapshotUpdate::Partial(second)) => {
                SnapshotUpdate::Partial(first.merge(second))
            }
        }
    }

    /// Apply this update to the current visible snapshot.
    pub fn apply_to(self, current: &mut ReviewSnapshot) {
        match self {
            SnapshotUpdate::Full(snapshot) => *current = snapshot,
            SnapshotUpdate::Partial(delta) => current.apply_delta(delta),
        }
    }
}

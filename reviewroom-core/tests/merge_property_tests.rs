use proptest::collection::vec;
use proptest::prelude::*;
use reviewroom_core::{
    FilterSet, ReviewPatch, ReviewSnapshot, SnapshotDelta, SnapshotUpdate, TeamPatch,
};
use std::collections::HashSet;
use uuid::Uuid;

// Small id pool so generated patches collide with each other.
fn id_strategy() -> impl Strategy<Value = Uuid> {
    (0u128..12).prop_map(Uuid::from_u128)
}

fn team_patch_strategy() -> impl Strategy<Value = TeamPatch> {
    (
        id_strategy(),
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(id, name, marks_submitted)| TeamPatch {
            id,
            name,
            marks_submitted,
            ..TeamPatch::default()
        })
}

// Review ids are unique within a snapshot, so a single delta list never
// carries the same id twice; the strategy upholds that.
fn patch_list_strategy() -> impl Strategy<Value = Vec<ReviewPatch>> {
    vec(
        (
            id_strategy(),
            proptest::option::of("[a-z]{1,8}"),
            proptest::option::of(vec(team_patch_strategy(), 0..3)),
        ),
        0..5,
    )
    .prop_map(|entries| {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(|(id, _, _)| seen.insert(*id))
            .map(|(id, title, teams)| {
                let teams = teams.map(|patches| {
                    let mut team_seen = HashSet::new();
                    patches
                        .into_iter()
                        .filter(|p| team_seen.insert(p.id))
                        .collect()
                });
                ReviewPatch {
                    id,
                    title,
                    teams,
                    ..ReviewPatch::default()
                }
            })
            .collect()
    })
}

fn delta_strategy() -> impl Strategy<Value = SnapshotDelta> {
    (
        proptest::option::of(patch_list_strategy()),
        proptest::option::of(patch_list_strategy()),
    )
        .prop_map(|(active, past)| SnapshotDelta {
            active,
            past,
            ..SnapshotDelta::default()
        })
}

fn snapshot_ids(snapshot: &ReviewSnapshot) -> HashSet<Uuid> {
    snapshot
        .active
        .iter()
        .chain(&snapshot.deadline_passed)
        .chain(&snapshot.past)
        .map(|r| r.id)
        .collect()
}

proptest! {
    #[test]
    fn delta_application_is_idempotent(delta in delta_strategy()) {
        let mut snapshot = ReviewSnapshot::default();
        snapshot.apply_delta(delta.clone());
        let once = snapshot.clone();
        snapshot.apply_delta(delta);
        prop_assert_eq!(snapshot, once);
    }

    #[test]
    fn merge_never_drops_existing_reviews(first in delta_strategy(), second in delta_strategy()) {
        let mut snapshot = ReviewSnapshot::default();
        snapshot.apply_delta(first);
        let before = snapshot_ids(&snapshot);
        snapshot.apply_delta(second);
        let after = snapshot_ids(&snapshot);
        prop_assert!(before.is_subset(&after));
    }

    #[test]
    fn merged_delta_equals_sequential_application(
        first in delta_strategy(),
        second in delta_strategy(),
    ) {
        let mut sequential = ReviewSnapshot::default();
        sequential.apply_delta(first.clone());
        sequential.apply_delta(second.clone());

        let mut combined = ReviewSnapshot::default();
        combined.apply_delta(first.merge(second));

        prop_assert_eq!(sequential, combined);
    }

    #[test]
    fn later_full_snapshot_supersedes_queue(
        queued in delta_strategy(),
        authoritative in delta_strategy(),
    ) {
        let mut full = ReviewSnapshot::default();
        full.apply_delta(authoritative);

        let merged = SnapshotUpdate::Partial(queued)
            .merge(SnapshotUpdate::Full(full.clone()));
        prop_assert_eq!(merged, SnapshotUpdate::Full(full));
    }

    #[test]
    fn filter_keys_are_stable(
        year in "[0-9]{4}-[0-9]{2}",
        school in "[A-Z]{3,6}",
        program in "[A-Z]{2,4}",
        review_type in "(guide|panel)",
    ) {
        let a = FilterSet::new(year.clone(), school.clone(), program.clone(), review_type.clone());
        let b = FilterSet::new(year, school, program, review_type);
        prop_assert_eq!(a.room_key(), b.room_key());
        prop_assert_eq!(a.cache_key(), b.room_key());
    }
}

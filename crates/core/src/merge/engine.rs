//! Three-way merge of Live sets.
//!
//! The engine works on a copy of the base document:
//!
//! 1. Work out which tracks each branch added and removed, by id.
//! 2. Drop tracks only when both branches removed them.
//! 3. Classify surviving tracks as modified per branch using semantic
//!    equality against the base.
//! 4. Apply one-sided edits, append additions, and hand tracks edited
//!    differently on both sides to the conflict coordinator.
//! 5. Finalize: put return tracks last, rebuild sends and repair ids.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::equality::{semantically_equal, Correspondence};
use super::{collision, routing};
use crate::config::{MergeConfig, ResolverConfig};
use crate::conflict::{Choice, CommandLauncher, Conflict, ConflictCoordinator, ResolverLauncher};
use crate::errors::{DocumentError, MergeError, MergeStage};
use crate::model::Document;

/// Counts describing one merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeStats {
    pub removed: usize,
    pub updated_from_ours: usize,
    pub updated_from_theirs: usize,
    /// Tracks both branches changed the same way.
    pub identical_in_both: usize,
    pub added_from_ours: usize,
    pub added_from_theirs: usize,
    pub conflicts: usize,
    pub resolved_ours: usize,
    pub resolved_theirs: usize,
    pub reassigned_track_ids: usize,
    pub reassigned_global_ids: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

/// The merged document and what it took to produce it.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub document: Document,
    pub stats: MergeStats,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The three-way merge engine.
pub struct MergeEngine {
    resolver: ResolverConfig,
    launcher: Arc<dyn ResolverLauncher>,
    cancel: CancellationToken,
}

impl MergeEngine {
    pub fn new(resolver: ResolverConfig, launcher: Arc<dyn ResolverLauncher>) -> Self {
        Self {
            resolver,
            launcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Engine that opens the resolver with the configured launcher command.
    pub fn from_config(config: &MergeConfig) -> Self {
        let launcher = CommandLauncher::new(config.resolver.launcher.clone());
        Self::new(config.resolver.clone(), Arc::new(launcher))
    }

    /// Use `cancel` to abort a pending conflict resolution wait.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Merge `ours` and `theirs`, both derived from `base`.
    ///
    /// Only suspends while divergent edits wait for the external resolver.
    #[instrument(skip_all, fields(base = base.tracks().len(), ours = ours.tracks().len(), theirs = theirs.tracks().len()))]
    pub async fn merge(
        &self,
        base: &Document,
        ours: &Document,
        theirs: &Document,
    ) -> Result<MergeOutcome, MergeError> {
        let mut stats = MergeStats {
            started_at: Utc::now().to_rfc3339(),
            ..Default::default()
        };
        let mut working = base.clone();

        // Structural diff and removals.
        let our_changes = BranchChanges::between(base, ours);
        let their_changes = BranchChanges::between(base, theirs);
        for id in our_changes.removed.intersection(&their_changes.removed) {
            stats.removed += working.remove_track(*id);
        }
        info!(
            ours_added = our_changes.added.len(),
            ours_removed = our_changes.removed.len(),
            theirs_added = their_changes.added.len(),
            theirs_removed = their_changes.removed.len(),
            removed = stats.removed,
            "computed structural changes"
        );

        // Classification.
        let ours_modified = modified_tracks(base, ours, &working);
        let theirs_modified = modified_tracks(base, theirs, &working);
        let theirs_set: HashSet<i64> = theirs_modified.iter().copied().collect();
        let ours_set: HashSet<i64> = ours_modified.iter().copied().collect();

        let mut conflicts = Vec::new();
        let mut agreed = Vec::new();
        for &id in ours_modified.iter().filter(|id| theirs_set.contains(id)) {
            let our_track = ours.track_by_id(id).map_err(at(MergeStage::Classification))?;
            let their_track = theirs.track_by_id(id).map_err(at(MergeStage::Classification))?;
            let correspondence = Correspondence::between(ours, theirs);
            if semantically_equal(
                ours.tree(),
                our_track.node(),
                theirs.tree(),
                their_track.node(),
                &correspondence,
            ) {
                debug!(track = id, "both branches made the same change");
                agreed.push(id);
            } else {
                debug!(track = id, "both branches changed track differently");
                conflicts.push(
                    conflict_for(id, base, ours, theirs).map_err(at(MergeStage::Classification))?,
                );
            }
        }
        info!(
            ours_modified = ours_modified.len(),
            theirs_modified = theirs_modified.len(),
            agreed = agreed.len(),
            conflicts = conflicts.len(),
            "classified modified tracks"
        );

        // Clean apply.
        for &id in ours_modified.iter().filter(|id| !theirs_set.contains(id)) {
            let track = ours.track_by_id(id).map_err(at(MergeStage::Apply))?;
            working.replace_track(ours, track);
            stats.updated_from_ours += 1;
        }
        for &id in theirs_modified.iter().filter(|id| !ours_set.contains(id)) {
            let track = theirs.track_by_id(id).map_err(at(MergeStage::Apply))?;
            working.replace_track(theirs, track);
            stats.updated_from_theirs += 1;
        }
        for &id in &agreed {
            let track = ours.track_by_id(id).map_err(at(MergeStage::Apply))?;
            working.replace_track(ours, track);
            stats.identical_in_both += 1;
        }

        // Additions, ours first.
        for (branch, added, count) in [
            (ours, &our_changes.added, &mut stats.added_from_ours),
            (theirs, &their_changes.added, &mut stats.added_from_theirs),
        ] {
            for &id in added {
                let track = branch.track_by_id(id).map_err(at(MergeStage::Additions))?;
                working.add_track(branch, track);
                *count += 1;
            }
        }
        info!(
            added_from_ours = stats.added_from_ours,
            added_from_theirs = stats.added_from_theirs,
            "applied changes"
        );

        // Divergent edits.
        stats.conflicts = conflicts.len();
        if !conflicts.is_empty() {
            let mut coordinator =
                ConflictCoordinator::new(self.resolver.clone(), self.launcher.clone(), conflicts);
            for (_, choice) in coordinator.resolve(&mut working, &self.cancel).await? {
                match choice {
                    Choice::Ours => stats.resolved_ours += 1,
                    Choice::Theirs => stats.resolved_theirs += 1,
                }
            }
        }

        finalize(&mut working, &mut stats).map_err(at(MergeStage::Finalization))?;

        stats.completed_at = Some(Utc::now().to_rfc3339());
        info!(
            tracks = working.tracks().len(),
            returns = working.return_tracks().len(),
            conflicts = stats.conflicts,
            "merge complete"
        );
        Ok(MergeOutcome {
            document: working,
            stats,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Tracks a branch added (in branch order) and removed, relative to base.
struct BranchChanges {
    added: Vec<i64>,
    removed: HashSet<i64>,
}

impl BranchChanges {
    fn between(base: &Document, branch: &Document) -> Self {
        let base_ids: HashSet<i64> = base.track_ids().into_iter().collect();
        let branch_ids: HashSet<i64> = branch.track_ids().into_iter().collect();

        let mut added = Vec::new();
        for id in branch.track_ids() {
            if !base_ids.contains(&id) && !added.contains(&id) {
                added.push(id);
            }
        }
        let removed = base_ids.difference(&branch_ids).copied().collect();
        Self { added, removed }
    }
}

/// Ids of base tracks, still in `working`, whose version in `branch`
/// differs from the base. In base order.
fn modified_tracks(base: &Document, branch: &Document, working: &Document) -> Vec<i64> {
    let correspondence = Correspondence::between(branch, base);
    let mut modified = Vec::new();
    for base_track in base.tracks() {
        let id = base_track.id();
        if modified.contains(&id) || !working.contains_track(id) {
            continue;
        }
        let Some(branch_track) = branch.find_track(id) else {
            continue;
        };
        if !semantically_equal(
            branch.tree(),
            branch_track.node(),
            base.tree(),
            base_track.node(),
            &correspondence,
        ) {
            modified.push(id);
        }
    }
    modified
}

fn conflict_for(
    id: i64,
    base: &Document,
    ours: &Document,
    theirs: &Document,
) -> Result<Conflict, DocumentError> {
    Ok(Conflict::new(
        base.snapshot(id)?,
        ours.snapshot(id)?,
        theirs.snapshot(id)?,
    ))
}

/// Bring the merged document back into a shape Live accepts. The order of
/// the steps is fixed: sends are materialized against the final return
/// order and final track ids, and id repair runs over the fresh send entries.
fn finalize(doc: &mut Document, stats: &mut MergeStats) -> Result<(), DocumentError> {
    doc.move_return_tracks_to_end();
    routing::reconcile(doc);
    stats.reassigned_track_ids = collision::resolve_track_id_collisions(doc).len();
    routing::materialize(doc)?;
    stats.reassigned_global_ids = collision::resolve_global_id_collisions(doc)?.len();
    routing::extend_sends_pre(doc)?;
    collision::bump_next_pointee_id(doc)?;
    info!(
        reassigned_track_ids = stats.reassigned_track_ids,
        reassigned_global_ids = stats.reassigned_global_ids,
        "finalized document"
    );
    Ok(())
}

fn at(stage: MergeStage) -> impl Fn(DocumentError) -> MergeError {
    move |source| MergeError::Document { stage, source }
}

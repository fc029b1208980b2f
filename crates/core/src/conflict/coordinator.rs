//! Hand-off of divergent track edits to an external resolver.
//!
//! The coordinator writes one container per conflict, opens the resolver on
//! all of them at once, waits for the resolver to drop its answer file and
//! then swaps the chosen versions into the working document.
//!
//! The resolution file location is shared configuration, so only one merge
//! may wait on a given location at a time. Containers go to a fresh
//! subdirectory of the scratch root per merge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::container;
use super::launcher::ResolverLauncher;
use super::resolution::{Choice, Resolution};
use super::Conflict;
use crate::config::ResolverConfig;
use crate::errors::{ConflictError, DocumentError};
use crate::model::Document;
use crate::package::{self, Compression, CONTAINER_EXTENSION};

/// Lifecycle of one batch of conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Pending,
    AwaitingExternalResolution,
    Resolved,
    Applied,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::AwaitingExternalResolution => write!(f, "awaiting_external_resolution"),
            Self::Resolved => write!(f, "resolved"),
            Self::Applied => write!(f, "applied"),
        }
    }
}

/// Drives one batch of conflicts through the external resolver.
pub struct ConflictCoordinator {
    config: ResolverConfig,
    launcher: Arc<dyn ResolverLauncher>,
    conflicts: Vec<Conflict>,
    state: CoordinatorState,
    /// Per-merge directory holding the containers.
    scratch: Option<PathBuf>,
    /// Container file names, one per conflict, in conflict order.
    containers: Vec<String>,
    choices: Vec<Choice>,
}

impl ConflictCoordinator {
    pub fn new(
        config: ResolverConfig,
        launcher: Arc<dyn ResolverLauncher>,
        conflicts: Vec<Conflict>,
    ) -> Self {
        Self {
            config,
            launcher,
            conflicts,
            state: CoordinatorState::Pending,
            scratch: None,
            containers: Vec::new(),
            choices: Vec::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Directory the containers were written to, once requested.
    pub fn scratch_dir(&self) -> Option<&Path> {
        self.scratch.as_deref()
    }

    /// Choices in conflict order, once resolved.
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Write the containers and open the resolver on them.
    ///
    /// Returns the container paths in conflict order.
    #[instrument(skip_all, fields(conflicts = self.conflicts.len()))]
    pub async fn request_resolution(&mut self) -> Result<Vec<PathBuf>, ConflictError> {
        self.expect_state(
            CoordinatorState::Pending,
            CoordinatorState::AwaitingExternalResolution,
        )?;

        let template = Document::load(&self.config.template_path)?;
        let scratch = self.config.scratch_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&scratch).await?;
        self.scratch = Some(scratch.clone());

        let mut paths = Vec::with_capacity(self.conflicts.len());
        for (i, conflict) in self.conflicts.iter().enumerate() {
            let path = write_container(&scratch, i, &template, conflict)?;
            debug!(track = conflict.track_id, path = %path.display(), "wrote conflict container");
            self.containers.push(format!("conf_{i}.{CONTAINER_EXTENSION}"));
            paths.push(path);
        }

        // An answer left over from an earlier run would be read as ours.
        if tokio::fs::try_exists(&self.config.resolution_file).await? {
            warn!(
                path = %self.config.resolution_file.display(),
                "removing stale resolution file"
            );
            tokio::fs::remove_file(&self.config.resolution_file).await?;
        }

        let joined = paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("+");
        let uri = format!("{}{}", self.config.handler_uri, joined);
        self.launcher.launch(&uri).await?;

        self.state = CoordinatorState::AwaitingExternalResolution;
        info!(containers = paths.len(), scratch = %scratch.display(), "awaiting external resolution");
        Ok(paths)
    }

    /// Wait for the resolution file and read one choice per conflict.
    ///
    /// Waits until the file appears and parses, the configured timeout
    /// elapses or `cancel` fires, whichever comes first. A file the resolver
    /// is still writing is polled again rather than rejected.
    #[instrument(skip_all, fields(path = %self.config.resolution_file.display()))]
    pub async fn await_resolution(&mut self, cancel: &CancellationToken) -> Result<(), ConflictError> {
        self.expect_state(
            CoordinatorState::AwaitingExternalResolution,
            CoordinatorState::Resolved,
        )?;

        let wait = poll_for_artifact(
            &self.config.resolution_file,
            self.config.poll_interval(),
            cancel,
        );
        let resolution = match self.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ConflictError::TimedOut {
                    waited_secs: limit.as_secs(),
                })??,
            None => wait.await?,
        };

        self.choices = resolution.choices_for(&self.containers)?;
        self.state = CoordinatorState::Resolved;
        info!(choices = self.choices.len(), "conflicts resolved");
        Ok(())
    }

    /// Swap each conflicting track for the chosen version and remove the
    /// scratch directory and the resolution file.
    ///
    /// Returns `(track id, choice)` per conflict.
    #[instrument(skip_all)]
    pub fn apply(&mut self, working: &mut Document) -> Result<Vec<(i64, Choice)>, ConflictError> {
        self.expect_state(CoordinatorState::Resolved, CoordinatorState::Applied)?;

        let mut applied = Vec::with_capacity(self.conflicts.len());
        for (conflict, &choice) in self.conflicts.iter().zip(&self.choices) {
            working.replace_with_snapshot(conflict.chosen(choice));
            debug!(track = conflict.track_id, %choice, "applied resolution");
            applied.push((conflict.track_id, choice));
        }

        self.cleanup()?;
        if self.config.resolution_file.exists() {
            std::fs::remove_file(&self.config.resolution_file)?;
        }
        self.state = CoordinatorState::Applied;
        Ok(applied)
    }

    /// Run the whole hand-off: request, wait, apply.
    ///
    /// A conflict-free batch goes straight to `Applied` without opening the
    /// resolver.
    pub async fn resolve(
        &mut self,
        working: &mut Document,
        cancel: &CancellationToken,
    ) -> Result<Vec<(i64, Choice)>, ConflictError> {
        if self.conflicts.is_empty() {
            self.expect_state(CoordinatorState::Pending, CoordinatorState::Applied)?;
            self.state = CoordinatorState::Applied;
            return Ok(Vec::new());
        }

        let waited = match self.request_resolution().await {
            Ok(_) => self.await_resolution(cancel).await,
            Err(e) => Err(e),
        };
        if let Err(e) = waited {
            if let Err(cleanup) = self.cleanup() {
                warn!(error = %cleanup, "failed to remove conflict scratch directory");
            }
            return Err(e);
        }
        self.apply(working)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn expect_state(
        &self,
        expected: CoordinatorState,
        next: CoordinatorState,
    ) -> Result<(), ConflictError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ConflictError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Remove this merge's scratch directory, and the scratch root too once
    /// nothing else is left in it.
    fn cleanup(&mut self) -> Result<(), ConflictError> {
        let Some(dir) = self.scratch.take() else {
            return Ok(());
        };
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            debug!(path = %dir.display(), "removed conflict scratch directory");
        }
        let root = &self.config.scratch_dir;
        if root.is_dir() && std::fs::read_dir(root)?.next().is_none() {
            std::fs::remove_dir(root)?;
            debug!(path = %root.display(), "removed empty scratch root");
        }
        Ok(())
    }
}

/// Write `conf_i.xml`, its packaged `conf_i.als` and the `conf_i.json`
/// record. Returns the packaged path.
fn write_container(
    dir: &Path,
    index: usize,
    template: &Document,
    conflict: &Conflict,
) -> Result<PathBuf, ConflictError> {
    let document = container::build(template, conflict)?;
    let xml_path = dir.join(format!("conf_{index}.xml"));
    document.save(&xml_path, Compression::Never)?;

    let packaged = dir.join(format!("conf_{index}.{CONTAINER_EXTENSION}"));
    package::gzip_file(&xml_path, &packaged)?;

    let record = conflict.record().map_err(DocumentError::from)?;
    let json = serde_json::to_vec_pretty(&record).map_err(std::io::Error::other)?;
    std::fs::write(dir.join(format!("conf_{index}.json")), json)?;
    Ok(packaged)
}

async fn poll_for_artifact(
    path: &Path,
    interval: std::time::Duration,
    cancel: &CancellationToken,
) -> Result<Resolution, ConflictError> {
    loop {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => match Resolution::parse(path, &content) {
                Ok(resolution) => return Ok(resolution),
                Err(ConflictError::InvalidArtifact { detail, .. }) => {
                    debug!(%detail, "resolution file incomplete, polling again");
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("conflict resolution cancelled");
                return Err(ConflictError::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    const TEMPLATE: &str = r#"<Ableton><LiveSet><Tracks/><SendsPre/></LiveSet></Ableton>"#;

    /// Records launched URIs and optionally answers, either straight away
    /// or in pieces appended after a delay each.
    struct FakeResolver {
        uris: Mutex<Vec<String>>,
        answer: Option<(PathBuf, Vec<(u64, String)>)>,
    }

    impl FakeResolver {
        fn answering(path: &Path, json: &str) -> Arc<Self> {
            Self::answering_later(path, &[(0, json)])
        }

        fn answering_later(path: &Path, pieces: &[(u64, &str)]) -> Arc<Self> {
            let pieces = pieces
                .iter()
                .map(|&(delay_ms, text)| (delay_ms, text.to_string()))
                .collect();
            Arc::new(Self {
                uris: Mutex::new(Vec::new()),
                answer: Some((path.to_path_buf(), pieces)),
            })
        }

        fn silent() -> Arc<Self> {
            Arc::new(Self {
                uris: Mutex::new(Vec::new()),
                answer: None,
            })
        }
    }

    fn append(path: &Path, text: &str) {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[async_trait]
    impl ResolverLauncher for FakeResolver {
        async fn launch(&self, uri: &str) -> Result<(), ConflictError> {
            self.uris.lock().unwrap().push(uri.to_string());
            let Some((path, pieces)) = self.answer.clone() else {
                return Ok(());
            };
            if pieces.iter().all(|(delay_ms, _)| *delay_ms == 0) {
                for (_, text) in &pieces {
                    append(&path, text);
                }
                return Ok(());
            }
            tokio::spawn(async move {
                for (delay_ms, text) in pieces {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    append(&path, &text);
                }
            });
            Ok(())
        }
    }

    fn config(root: &Path) -> ResolverConfig {
        std::fs::write(root.join("blank.xml"), TEMPLATE).unwrap();
        ResolverConfig {
            scratch_dir: root.join("scratch"),
            template_path: root.join("blank.xml"),
            resolution_file: root.join("done"),
            handler_uri: "jackdaw://merge/".into(),
            launcher: "unused".into(),
            poll_interval_ms: 10,
            timeout_secs: None,
        }
    }

    fn version(id: i64, volume: &str) -> Document {
        Document::parse(&format!(
            r#"<Ableton><LiveSet><Tracks>
                <MidiTrack Id="{id}"><Name><UserName Value="Keys"/></Name><Volume Value="{volume}"/>
                    <DeviceChain><Mixer><Sends/></Mixer></DeviceChain></MidiTrack>
            </Tracks><SendsPre/></LiveSet></Ableton>"#
        ))
        .unwrap()
    }

    fn conflict(id: i64) -> (Document, Conflict) {
        let base = version(id, "1");
        let ours = version(id, "0.5");
        let theirs = version(id, "0.25");
        let conflict = Conflict::new(
            base.snapshot(id).unwrap(),
            ours.snapshot(id).unwrap(),
            theirs.snapshot(id).unwrap(),
        );
        (base, conflict)
    }

    fn volume(doc: &Document, id: i64) -> String {
        let tree = doc.tree();
        let vol = tree.child(doc.track_by_id(id).unwrap().node(), "Volume").unwrap();
        tree.attr(vol, "Value").unwrap().to_string()
    }

    #[tokio::test]
    async fn test_full_hand_off_applies_choice_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let resolver = FakeResolver::answering(&config.resolution_file, r#"{"conf_0.als": false}"#);
        let (mut working, conflict) = conflict(4);

        let mut coordinator = ConflictCoordinator::new(config.clone(), resolver.clone(), vec![conflict]);
        let applied = coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(applied, vec![(4, Choice::Theirs)]);
        assert_eq!(coordinator.state(), CoordinatorState::Applied);
        assert_eq!(volume(&working, 4), "0.25");
        assert!(!config.resolution_file.exists());
        assert!(!config.scratch_dir.exists());

        let uris = resolver.uris.lock().unwrap();
        assert_eq!(uris.len(), 1);
        assert!(uris[0].starts_with("jackdaw://merge/"));
        assert!(uris[0].ends_with("conf_0.als"));
    }

    #[tokio::test]
    async fn test_request_writes_container_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let (_, first) = conflict(4);
        let (_, second) = conflict(5);

        let mut coordinator =
            ConflictCoordinator::new(config.clone(), FakeResolver::silent(), vec![first, second]);
        let paths = coordinator.request_resolution().await.unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::AwaitingExternalResolution);
        assert_eq!(paths.len(), 2);

        let scratch = coordinator.scratch_dir().unwrap().to_path_buf();
        assert!(scratch.starts_with(&config.scratch_dir));
        for name in ["conf_0.xml", "conf_0.als", "conf_0.json", "conf_1.als"] {
            assert!(scratch.join(name).exists(), "missing {name}");
        }

        let packaged = Document::load(&paths[0]).unwrap();
        assert_eq!(packaged.track_ids(), vec![10, 20]);

        let record: crate::conflict::ConflictRecord =
            serde_json::from_slice(&std::fs::read(scratch.join("conf_1.json")).unwrap()).unwrap();
        assert_eq!(record.track_id, 5);
        assert!(record.theirs.contains("0.25"));
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut working, conflict) = conflict(4);
        let mut coordinator =
            ConflictCoordinator::new(config(dir.path()), FakeResolver::silent(), vec![conflict]);

        assert!(matches!(
            coordinator.apply(&mut working),
            Err(ConflictError::InvalidTransition { .. })
        ));
        assert!(matches!(
            coordinator.await_resolution(&CancellationToken::new()).await,
            Err(ConflictError::InvalidTransition { .. })
        ));
        assert_eq!(coordinator.state(), CoordinatorState::Pending);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let (mut working, conflict) = conflict(4);
        let mut coordinator =
            ConflictCoordinator::new(config.clone(), FakeResolver::silent(), vec![conflict]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = coordinator.resolve(&mut working, &cancel).await.unwrap_err();
        assert!(matches!(err, ConflictError::Cancelled));
        assert_eq!(volume(&working, 4), "1");
        assert!(!config.scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_answer_arriving_after_several_polls_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let resolver =
            FakeResolver::answering_later(&config.resolution_file, &[(60, r#"{"conf_0.als": true}"#)]);
        let (mut working, conflict) = conflict(4);

        let mut coordinator = ConflictCoordinator::new(config.clone(), resolver, vec![conflict]);
        coordinator.request_resolution().await.unwrap();
        assert!(!config.resolution_file.exists());

        coordinator.await_resolution(&CancellationToken::new()).await.unwrap();
        assert_eq!(coordinator.choices(), &[Choice::Ours]);
        assert_eq!(
            coordinator.apply(&mut working).unwrap(),
            vec![(4, Choice::Ours)]
        );
        assert_eq!(volume(&working, 4), "0.5");
    }

    #[tokio::test]
    async fn test_half_written_answer_is_polled_again() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let resolver = FakeResolver::answering_later(
            &config.resolution_file,
            &[(30, r#"{"conf_0.als""#), (100, ": false}")],
        );
        let (mut working, conflict) = conflict(4);

        let mut coordinator = ConflictCoordinator::new(config.clone(), resolver, vec![conflict]);
        let applied = coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(applied, vec![(4, Choice::Theirs)]);
        assert_eq!(volume(&working, 4), "0.25");
        assert!(!config.scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_scratch_root_with_other_content_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(config.scratch_dir.join("other")).unwrap();
        let resolver = FakeResolver::answering(&config.resolution_file, r#"{"conf_0.als": true}"#);
        let (mut working, conflict) = conflict(4);

        let mut coordinator = ConflictCoordinator::new(config.clone(), resolver, vec![conflict]);
        coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap();
        let left: Vec<_> = std::fs::read_dir(&config.scratch_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("other")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.timeout_secs = Some(5);
        let (mut working, conflict) = conflict(4);
        let mut coordinator =
            ConflictCoordinator::new(config, FakeResolver::silent(), vec![conflict]);

        let err = coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::TimedOut { waited_secs: 5 }));
    }

    #[tokio::test]
    async fn test_incomplete_answer_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let resolver = FakeResolver::answering(&config.resolution_file, r#"{"conf_0.als": true}"#);
        let (mut working, first) = conflict(4);
        let (_, second) = conflict(5);

        let mut coordinator = ConflictCoordinator::new(config, resolver, vec![first, second]);
        let err = coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConflictError::MissingResolution(ref n) if n == "conf_1.als"));
    }

    #[tokio::test]
    async fn test_missing_template_fails_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.template_path = dir.path().join("nope.xml");
        let (_, conflict) = conflict(4);
        let mut coordinator =
            ConflictCoordinator::new(config, FakeResolver::silent(), vec![conflict]);
        assert!(matches!(
            coordinator.request_resolution().await,
            Err(ConflictError::Container(_))
        ));
    }

    #[tokio::test]
    async fn test_no_conflicts_skips_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = FakeResolver::silent();
        let mut working = version(4, "1");
        let mut coordinator = ConflictCoordinator::new(config(dir.path()), resolver.clone(), vec![]);
        let applied = coordinator
            .resolve(&mut working, &CancellationToken::new())
            .await
            .unwrap();
        assert!(applied.is_empty());
        assert!(resolver.uris.lock().unwrap().is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Applied);
    }
}

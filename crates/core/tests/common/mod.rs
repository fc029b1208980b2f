//! Shared fixtures for the integration tests.
//!
//! Live sets are built from a compact description. Every track carries one
//! send entry per return track in the same shape the merge writes, so an
//! untouched set survives a merge semantically unchanged.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use livemerge_core::config::ResolverConfig;
use livemerge_core::conflict::ResolverLauncher;
use livemerge_core::errors::ConflictError;
use livemerge_core::merge::MergeEngine;
use livemerge_core::model::schema;
use livemerge_core::model::Document;

// ===========================================================================
// Track fixtures
// ===========================================================================

#[derive(Debug, Clone)]
pub struct TrackFixture {
    pub tag: &'static str,
    pub id: i64,
    pub name: String,
    pub volume: f64,
    /// Send gains by return position. Padded with zeros to the return count.
    pub sends: Vec<f64>,
}

impl TrackFixture {
    fn new(tag: &'static str, id: i64, name: &str) -> Self {
        Self {
            tag,
            id,
            name: name.to_string(),
            volume: 0.85,
            sends: Vec::new(),
        }
    }

    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = volume;
        self
    }

    pub fn sends(mut self, sends: &[f64]) -> Self {
        self.sends = sends.to_vec();
        self
    }

    fn to_xml(&self, returns: usize) -> String {
        let target = self.id * 100;
        let holders: String = (0..returns)
            .map(|i| {
                let value = self.sends.get(i).copied().unwrap_or(0.0);
                send_holder(i, value, target + 1 + 2 * i as i64)
            })
            .collect();
        format!(
            concat!(
                r#"<{tag} Id="{id}">"#,
                r#"<Name><EffectiveName Value="{name}"/><UserName Value="{name}"/></Name>"#,
                r#"<IsArmed Value="false"/>"#,
                r#"<DeviceChain><Mixer>"#,
                r#"<Volume><Manual Value="{volume}"/><AutomationTarget Id="{target}"><LockEnvelope Value="0"/></AutomationTarget></Volume>"#,
                r#"<Sends>{holders}</Sends>"#,
                r#"</Mixer></DeviceChain>"#,
                r#"</{tag}>"#
            ),
            tag = self.tag,
            id = self.id,
            name = self.name,
            volume = self.volume,
            target = target,
            holders = holders,
        )
    }
}

pub fn midi(id: i64, name: &str) -> TrackFixture {
    TrackFixture::new("MidiTrack", id, name)
}

pub fn audio(id: i64, name: &str) -> TrackFixture {
    TrackFixture::new("AudioTrack", id, name)
}

pub fn ret(id: i64, name: &str) -> TrackFixture {
    TrackFixture::new("ReturnTrack", id, name)
}

fn send_holder(position: usize, value: f64, target: i64) -> String {
    format!(
        concat!(
            r#"<TrackSendHolder Id="{position}"><Send>"#,
            r#"<LomId Value="0"/><Manual Value="{value}"/>"#,
            r#"<MidiControllerRange><Min Value="0.0003162277571"/><Max Value="1"/></MidiControllerRange>"#,
            r#"<AutomationTarget Id="{a}"><LockEnvelope Value="0"/></AutomationTarget>"#,
            r#"<ModulationTarget Id="{m}"><LockEnvelope Value="0"/></ModulationTarget>"#,
            r#"</Send><Active Value="true"/></TrackSendHolder>"#
        ),
        position = position,
        value = value,
        a = target,
        m = target + 1,
    )
}

// ===========================================================================
// Documents
// ===========================================================================

/// XML text of a Live set holding `tracks` in the given order.
pub fn live_set_xml(tracks: &[TrackFixture]) -> String {
    let returns = tracks.iter().filter(|t| t.tag == "ReturnTrack").count();
    let body: String = tracks.iter().map(|t| t.to_xml(returns)).collect();
    let sends_pre: String = (0..returns)
        .map(|i| format!(r#"<SendPreBool Id="{i}" Value="false"/>"#))
        .collect();
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<Ableton MajorVersion="5" MinorVersion="10.0_377" Creator="Ableton Live 10.0.1">"#,
            r#"<LiveSet><NextPointeeId Value="1"/><OverwriteProtectionNumber Value="2560"/>"#,
            r#"<Tracks>{body}</Tracks>"#,
            r#"<SendsPre>{sends_pre}</SendsPre>"#,
            r#"</LiveSet></Ableton>"#
        ),
        body = body,
        sends_pre = sends_pre,
    )
}

pub fn document(tracks: &[TrackFixture]) -> Document {
    Document::parse(&live_set_xml(tracks)).expect("fixture must parse")
}

/// `Value` of the element at `path` below track `id`.
pub fn value_at(doc: &Document, id: i64, path: &[&str]) -> String {
    let tree = doc.tree();
    let node = tree
        .find_path(doc.track_by_id(id).unwrap().node(), path)
        .unwrap_or_else(|| panic!("track {id} has no {}", path.join("/")));
    tree.attr(node, "Value").unwrap().to_string()
}

pub fn volume_of(doc: &Document, id: i64) -> String {
    value_at(doc, id, &["DeviceChain", "Mixer", "Volume", "Manual"])
}

pub fn name_of(doc: &Document, id: i64) -> String {
    value_at(doc, id, schema::USER_NAME_PATH)
}

/// Materialized send gains of track `id`, in holder order.
pub fn send_values(doc: &Document, id: i64) -> Vec<String> {
    let tree = doc.tree();
    let sends = tree
        .find_path(doc.track_by_id(id).unwrap().node(), schema::SENDS_PATH)
        .unwrap();
    tree.children(sends)
        .iter()
        .map(|&holder| {
            let manual = tree.find_path(holder, schema::SEND_VALUE_PATH).unwrap();
            tree.attr(manual, "Value").unwrap().to_string()
        })
        .collect()
}

/// Ids of every collidable node, in document order.
pub fn collidable_ids(doc: &Document) -> Vec<i64> {
    let tree = doc.tree();
    tree.descendants(tree.root())
        .into_iter()
        .filter(|&n| schema::is_collidable(tree.tag(n)))
        .map(|n| tree.attr(n, "Id").unwrap().parse().unwrap())
        .collect()
}

// ===========================================================================
// Resolver fakes
// ===========================================================================

/// Fails if the merge ever tries to open the resolver.
pub struct UnexpectedLauncher;

#[async_trait]
impl ResolverLauncher for UnexpectedLauncher {
    async fn launch(&self, uri: &str) -> Result<(), ConflictError> {
        Err(ConflictError::LaunchFailed {
            command: "unexpected".into(),
            detail: format!("resolver opened for {uri}"),
        })
    }
}

/// Writes a fixed answer to the resolution file when launched.
pub struct AnsweringLauncher {
    pub resolution_file: PathBuf,
    pub answer: String,
    pub launched: Mutex<Vec<String>>,
}

#[async_trait]
impl ResolverLauncher for AnsweringLauncher {
    async fn launch(&self, uri: &str) -> Result<(), ConflictError> {
        self.launched.lock().unwrap().push(uri.to_string());
        std::fs::write(&self.resolution_file, &self.answer)?;
        Ok(())
    }
}

/// Appends each piece to the resolution file after its delay, in the
/// background, as a resolver still being worked by a human would.
pub struct LaterLauncher {
    pub resolution_file: PathBuf,
    pub pieces: Vec<(Duration, String)>,
}

#[async_trait]
impl ResolverLauncher for LaterLauncher {
    async fn launch(&self, _uri: &str) -> Result<(), ConflictError> {
        let path = self.resolution_file.clone();
        let pieces = self.pieces.clone();
        tokio::spawn(async move {
            for (delay, text) in pieces {
                tokio::time::sleep(delay).await;
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .unwrap();
                file.write_all(text.as_bytes()).unwrap();
            }
        });
        Ok(())
    }
}

/// Engine whose resolver writes `pieces` (delay in ms, text) one by one.
pub fn later_engine(dir: &Path, pieces: &[(u64, &str)]) -> MergeEngine {
    let config = resolver_config(dir);
    let launcher = LaterLauncher {
        resolution_file: config.resolution_file.clone(),
        pieces: pieces
            .iter()
            .map(|&(ms, text)| (Duration::from_millis(ms), text.to_string()))
            .collect(),
    };
    MergeEngine::new(config, Arc::new(launcher))
}

/// Resolver settings rooted in `dir`, with a blank template written there.
pub fn resolver_config(dir: &Path) -> ResolverConfig {
    let template = dir.join("blank.xml");
    std::fs::write(&template, live_set_xml(&[audio(1, "Audio")])).unwrap();
    ResolverConfig {
        scratch_dir: dir.join(".conftemp"),
        template_path: template,
        resolution_file: dir.join("done"),
        poll_interval_ms: 10,
        ..ResolverConfig::default()
    }
}

/// Engine that must not need the resolver.
pub fn engine() -> MergeEngine {
    MergeEngine::new(ResolverConfig::default(), Arc::new(UnexpectedLauncher))
}

/// Engine whose resolver answers `answer` immediately.
pub fn answering_engine(dir: &Path, answer: &str) -> (MergeEngine, Arc<AnsweringLauncher>) {
    let config = resolver_config(dir);
    let launcher = Arc::new(AnsweringLauncher {
        resolution_file: config.resolution_file.clone(),
        answer: answer.to_string(),
        launched: Mutex::new(Vec::new()),
    });
    (MergeEngine::new(config, launcher.clone()), launcher)
}
